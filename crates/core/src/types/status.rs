//! Status enums for ledger entities.
//!
//! Every enum round-trips through the lowercase string stored in the ledger,
//! so the `Display` and `FromStr` impls double as the storage format.

use serde::{Deserialize, Serialize};

/// Error returned when a stored or user-supplied status string is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// =============================================================================
// Role
// =============================================================================

/// Access level of an identity within its enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlite", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlite", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Registered but not yet approved.
    #[default]
    Unset,
    /// Buys from the shop with its balance.
    Worker,
    /// Tops up worker balances.
    Manager,
    /// Full control over one enterprise.
    Admin,
}

impl Role {
    /// Roles an admin may assign through the role picker.
    pub const ASSIGNABLE: [Self; 3] = [Self::Worker, Self::Manager, Self::Admin];

    /// Storage and payload form of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Worker => "worker",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// Whether the role may top up worker balances.
    #[must_use]
    pub const fn can_top_up(self) -> bool {
        matches!(self, Self::Manager | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "unset" => Ok(Self::Unset),
            "worker" => Ok(Self::Worker),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            other => Err(ParseStatusError::new("role", other)),
        }
    }
}

// =============================================================================
// OrderStatus
// =============================================================================

/// Lifecycle of a purchase order. `Pending` transitions once, terminally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlite", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlite", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Accepted,
    Denied,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Denied => "denied",
        }
    }

    /// Whether the order can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "denied" => Ok(Self::Denied),
            other => Err(ParseStatusError::new("order status", other)),
        }
    }
}

// =============================================================================
// RegistrationState
// =============================================================================

/// Registration progress persisted on the identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// No registration in progress.
    #[default]
    None,
    /// `/start` was issued and the profile line is expected next.
    WaitingRegistrationData,
}

impl RegistrationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::WaitingRegistrationData => "waiting_registration_data",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistrationState {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "waiting_registration_data" => Ok(Self::WaitingRegistrationData),
            other => Err(ParseStatusError::new("registration state", other)),
        }
    }
}
