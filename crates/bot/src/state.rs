//! Shared bot state.

use std::sync::Arc;

use sqlx::SqlitePool;

use crewstore_core::UserId;

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::conversation::ConversationTable;
use crate::gateway::Gateway;
use crate::services::Notifier;

/// Shared state handed to every update task.
pub struct BotState<G> {
    inner: Arc<BotStateInner<G>>,
}

struct BotStateInner<G> {
    pool: SqlitePool,
    notifier: Notifier<G>,
    conversations: ConversationTable,
    clock: Arc<dyn Clock>,
    rules: LedgerConfig,
    super_user: UserId,
}

impl<G> Clone for BotState<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: Gateway> BotState<G> {
    /// Create new bot state.
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        gateway: Arc<G>,
        clock: Arc<dyn Clock>,
        rules: LedgerConfig,
        super_user: UserId,
    ) -> Self {
        Self {
            inner: Arc::new(BotStateInner {
                pool,
                notifier: Notifier::new(gateway),
                conversations: ConversationTable::new(rules.conversation_idle),
                clock,
                rules,
                super_user,
            }),
        }
    }

    /// Get the database pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier<G> {
        &self.inner.notifier
    }

    #[must_use]
    pub fn conversations(&self) -> &ConversationTable {
        &self.inner.conversations
    }

    /// Ledger timing rules.
    #[must_use]
    pub fn rules(&self) -> LedgerConfig {
        self.inner.rules
    }

    #[must_use]
    pub fn super_user(&self) -> UserId {
        self.inner.super_user
    }

    /// Current time, epoch seconds.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.inner.clock.now()
    }
}
