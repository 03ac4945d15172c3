//! Per-identity state of multi-step conversations.
//!
//! Each identity has at most one flow in progress. Entries live in a
//! concurrent cache with idle expiry: turns from different identities never
//! contend, and an abandoned flow disappears on its own. Nothing here is
//! persisted; a restart drops every flow in progress (registration keeps its
//! progress on the identity record instead).

use std::time::Duration;

use moka::future::Cache;

use crewstore_core::{ProductId, Role, UserId};

use crate::models::CorrectionField;

/// What the next free-text message from an identity is expected to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    /// New value for a profile field of `target`.
    AwaitingFieldValue {
        target: UserId,
        field: CorrectionField,
    },
    /// Schedule number of the identity that should receive `role`.
    AwaitingRoleTarget { role: Role },
    /// Admin hand-over waiting for the confirm/cancel button.
    ConfirmAdmin { schedule_number: String },
    /// New price of an existing product.
    ProductPrice { product: ProductId },
    /// New stock count of an existing product.
    ProductRemaining { product: ProductId },
    /// Name of a product being added.
    NewProductName,
    /// Price of a product being added.
    NewProductPrice { name: String },
    /// Stock count of a product being added.
    NewProductRemaining { name: String, price: i64 },
    /// Super user: enterprise number to move to.
    SuperEnterprise,
    /// Super user: role to take.
    SuperRole,
}

/// Concurrent identity → conversation state table.
#[derive(Clone)]
pub struct ConversationTable {
    states: Cache<UserId, ConversationState>,
}

impl ConversationTable {
    /// Create a table whose entries expire after `idle` without activity.
    #[must_use]
    pub fn new(idle: Duration) -> Self {
        Self {
            states: Cache::builder().time_to_idle(idle).build(),
        }
    }

    /// Start (or restart) a flow for `user`, replacing any flow in progress.
    pub async fn begin(&self, user: UserId, state: ConversationState) {
        tracing::debug!(user_id = %user, ?state, "conversation step");
        self.states.insert(user, state).await;
    }

    /// Current state of `user`, if any.
    pub async fn get(&self, user: UserId) -> Option<ConversationState> {
        self.states.get(&user).await
    }

    /// Remove and return the state of `user`.
    pub async fn take(&self, user: UserId) -> Option<ConversationState> {
        self.states.remove(&user).await
    }

    /// Drop the flow of `user`, if any.
    pub async fn clear(&self, user: UserId) {
        self.states.invalidate(&user).await;
    }
}

impl std::fmt::Debug for ConversationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationTable")
            .field("entries", &self.states.entry_count())
            .finish()
    }
}
