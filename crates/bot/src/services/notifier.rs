//! Best-effort delivery to identities other than the caller.
//!
//! Notifications are sent after the ledger mutation has committed. A failed
//! delivery is logged and never undoes or fails the operation that caused it.

use std::sync::Arc;

use tracing::{debug, warn};

use crewstore_core::UserId;

use crate::gateway::{Gateway, OutboundMessage, Reply};

/// Fire-and-log wrapper around the gateway.
pub struct Notifier<G> {
    gateway: Arc<G>,
}

impl<G> Clone for Notifier<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<G: Gateway> Notifier<G> {
    #[must_use]
    pub const fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Deliver a message. Returns whether the gateway accepted it.
    pub async fn deliver(&self, message: OutboundMessage) -> bool {
        let to = message.to;
        match self.gateway.send(message).await {
            Ok(()) => {
                debug!(user_id = %to, "Notification delivered");
                true
            }
            Err(e) => {
                warn!(user_id = %to, error = %e, "Notification delivery failed");
                false
            }
        }
    }

    /// Deliver `reply` to `to`.
    pub async fn reply(&self, to: UserId, reply: Reply) -> bool {
        self.deliver(reply.to(to)).await
    }

    /// Deliver plain text to `to`.
    pub async fn text(&self, to: UserId, text: impl Into<String>) -> bool {
        self.deliver(OutboundMessage::text(to, text)).await
    }
}
