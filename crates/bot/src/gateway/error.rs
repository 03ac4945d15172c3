//! Messaging gateway errors.

use thiserror::Error;

/// Errors that can occur when talking to the chat transport.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("Gateway request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Gateway response error: {0}")]
    Response(String),

    /// Transport rejected the call.
    #[error("Gateway API error: {0}")]
    Api(String),

    /// Credentials were rejected; polling cannot continue.
    #[error("Gateway authentication failed")]
    Unauthorized,

    /// Configuration error.
    #[error("Gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether the runtime must stop instead of retrying.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Config(_))
    }
}
