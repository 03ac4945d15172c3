//! Identity domain types.

use crewstore_core::{EnterpriseId, RegistrationState, Role, UserId};

/// A chat identity known to the ledger (domain type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// External chat identity.
    pub id: UserId,
    /// Chat handle at the time of the last `/start`.
    pub username: String,
    /// Display name collected during registration.
    pub name: String,
    /// Schedule number, unique inside one enterprise. Empty until registered.
    pub schedule_number: String,
    /// Enterprise the identity belongs to.
    pub enterprise_id: Option<EnterpriseId>,
    pub role: Role,
    /// Set once an admin approves the registration.
    pub verified: bool,
    /// Point balance, never negative.
    pub balance: i64,
    /// Epoch seconds of the last top-up, 0 when never topped up.
    pub last_topup_at: i64,
    pub reg_state: RegistrationState,
    /// Epoch seconds when the current registration attempt began.
    pub reg_started_at: Option<i64>,
    /// Counterparty stashed between two turns.
    pub scratch: Option<i64>,
}

impl User {
    /// Short "15 Ivan Petrov" label used in pickers and order lists.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.schedule_number.is_empty(), self.name.is_empty()) {
            (false, false) => format!("{} {}", self.schedule_number, self.name),
            (false, true) => self.schedule_number.clone(),
            (true, false) => self.name.clone(),
            (true, true) => self.id.to_string(),
        }
    }
}

/// Profile line parsed from a registration message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationProfile {
    pub schedule_number: String,
    pub name: String,
    pub enterprise_id: EnterpriseId,
}

/// Result of a cooldown-guarded credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopUpOutcome {
    /// Balance credited; carries the new balance.
    Credited { balance: i64 },
    /// Cooldown still running; carries the last top-up time.
    Cooldown { last_topup_at: i64 },
}

/// Profile field an admin can correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrectionField {
    Balance,
    Name,
    Schedule,
    Delete,
}

impl CorrectionField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Name => "name",
            Self::Schedule => "schedule",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for CorrectionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CorrectionField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance" => Ok(Self::Balance),
            "name" => Ok(Self::Name),
            "schedule" => Ok(Self::Schedule),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown field: {other}")),
        }
    }
}

/// A validated value for one correctable profile field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    Balance(i64),
    Name(String),
    Schedule(String),
}

impl Correction {
    /// Validate raw admin input for `field`.
    ///
    /// Numeric fields must be non-negative integers; names must not be blank.
    ///
    /// # Errors
    ///
    /// Returns a user-facing description of what is wrong with the input.
    pub fn parse(field: CorrectionField, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match field {
            CorrectionField::Balance => parse_non_negative(raw).map(Self::Balance),
            CorrectionField::Schedule => {
                parse_non_negative(raw).map(|n| Self::Schedule(n.to_string()))
            }
            CorrectionField::Name if raw.is_empty() => Err("The name must not be empty.".to_string()),
            CorrectionField::Name => Ok(Self::Name(collapse_whitespace(raw))),
            CorrectionField::Delete => Err("Deletion takes no value.".to_string()),
        }
    }
}

/// Parse a non-negative integer.
///
/// # Errors
///
/// Returns a user-facing message when `raw` is not a whole number or is negative.
pub fn parse_non_negative(raw: &str) -> Result<i64, String> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| "Numbers only, please! ⛔️".to_string())?;
    if n < 0 {
        return Err("The value can't be negative! ⛔️".to_string());
    }
    Ok(n)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correction_balance() {
        assert_eq!(
            Correction::parse(CorrectionField::Balance, " 40 "),
            Ok(Correction::Balance(40))
        );
        assert!(Correction::parse(CorrectionField::Balance, "-1").is_err());
        assert!(Correction::parse(CorrectionField::Balance, "ten").is_err());
    }

    #[test]
    fn test_correction_schedule_normalized() {
        assert_eq!(
            Correction::parse(CorrectionField::Schedule, "015"),
            Ok(Correction::Schedule("15".to_string()))
        );
    }

    #[test]
    fn test_correction_name() {
        assert_eq!(
            Correction::parse(CorrectionField::Name, "  Anna   Maria "),
            Ok(Correction::Name("Anna Maria".to_string()))
        );
        assert!(Correction::parse(CorrectionField::Name, "   ").is_err());
        assert!(Correction::parse(CorrectionField::Delete, "yes").is_err());
    }

    #[test]
    fn test_label() {
        let user = User {
            id: UserId::new(9),
            username: String::new(),
            name: "Petr Ivanov".to_string(),
            schedule_number: "15".to_string(),
            enterprise_id: Some(EnterpriseId::new(11047)),
            role: Role::Worker,
            verified: true,
            balance: 0,
            last_topup_at: 0,
            reg_state: RegistrationState::None,
            reg_started_at: None,
            scratch: None,
        };
        assert_eq!(user.label(), "15 Petr Ivanov");
    }
}
