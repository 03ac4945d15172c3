//! Unified error handling for the bot.

use thiserror::Error;

use crewstore_core::Role;

use crate::db::RepositoryError;

/// Application-level error type returned by the services.
///
/// Every variant has a user-facing rendering in [`AppError::user_message`];
/// none of them leaks internal error text to the chat.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Buyer balance is below the price.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Product has no units left.
    #[error("Out of stock")]
    OutOfStock,

    /// Actor and target belong to different enterprises.
    #[error("Cross-enterprise operation")]
    CrossTenant,

    /// Top-up attempted before the cooldown elapsed.
    #[error("Cooldown active for {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    /// Order already accepted or denied.
    #[error("Order already processed")]
    AlreadyProcessed,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller's role does not allow the action.
    #[error("Access denied for role {0}")]
    AccessDenied(Role),

    /// Transient store failure.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(RepositoryError),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("record".to_string()),
            RepositoryError::Conflict(what) => Self::Conflict(what),
            RepositoryError::InsufficientFunds => Self::InsufficientFunds,
            RepositoryError::OutOfStock => Self::OutOfStock,
            RepositoryError::AlreadyProcessed => Self::AlreadyProcessed,
            err @ (RepositoryError::Database(_) | RepositoryError::DataCorruption(_)) => {
                Self::StoreUnavailable(err)
            }
        }
    }
}

impl AppError {
    /// Text shown to the person whose action failed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) => format!("❗ {reason}"),
            Self::InsufficientFunds => "Not enough points on your balance.".to_string(),
            Self::OutOfStock => "❗ This product is sold out.".to_string(),
            Self::CrossTenant => "⛔ That belongs to another enterprise.".to_string(),
            Self::CooldownActive { remaining_secs } => {
                format!("❗ Cooldown: {} left.", format_wait(*remaining_secs))
            }
            Self::AlreadyProcessed => "The order was already processed! ⛔️".to_string(),
            Self::NotFound(_) => "❌ Nothing found. Please start over.".to_string(),
            Self::Conflict(what) => format!("❌ {what}."),
            Self::AccessDenied(role) => format!("⛔ Access denied. Your role: {role}"),
            Self::StoreUnavailable(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }

    /// Log the failure and report infrastructure errors to Sentry.
    pub fn report(&self) {
        if matches!(self, Self::StoreUnavailable(_)) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Ledger store error"
            );
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
    }
}

/// Render a wait as "Xh Ym".
#[must_use]
pub fn format_wait(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

/// Set the Sentry user context to the chat identity being served.
pub fn set_sentry_user(user_id: i64, username: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: username.map(String::from),
            ..Default::default()
        }));
    });
}
