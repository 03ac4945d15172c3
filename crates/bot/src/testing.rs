//! Test fixtures: a throwaway store, a recording gateway and a harness that
//! drives the dispatcher the way the polling runtime does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sqlx::SqlitePool;
use tempfile::TempDir;

use crewstore_core::{EnterpriseId, ProductId, Role, UserId};

pub use crate::clock::ManualClock;
use crate::config::{DatabaseConfig, LedgerConfig};
use crate::db;
use crate::dispatch::Dispatcher;
use crate::gateway::{CallbackAction, Gateway, GatewayError, InboundEvent, OutboundMessage, TextMessage};
use crate::state::BotState;

/// Epoch seconds the manual clock starts at in harnesses.
pub const START_TIME: i64 = 1_700_000_000;

/// Migrated SQLite database in a temporary directory.
pub struct TestStore {
    pool: SqlitePool,
    _dir: TempDir,
}

impl TestStore {
    /// Create and migrate a fresh store.
    ///
    /// # Panics
    ///
    /// Panics if the temporary database cannot be created.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        };

        let pool = db::create_pool(&config).await.expect("open test store");
        db::run_migrations(&pool).await.expect("migrate test store");

        Self { pool, _dir: dir }
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a verified identity named "User <id>".
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn seed_user(
        &self,
        id: i64,
        enterprise: i64,
        role: Role,
        schedule: &str,
        balance: i64,
    ) -> UserId {
        sqlx::query(
            r"
            INSERT INTO users (id, username, name, schedule_number, enterprise_id, role,
                               verified, balance)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            ",
        )
        .bind(id)
        .bind(format!("user{id}"))
        .bind(format!("User {id}"))
        .bind(schedule)
        .bind(EnterpriseId::new(enterprise))
        .bind(role)
        .bind(balance)
        .execute(&self.pool)
        .await
        .expect("seed user");

        UserId::new(id)
    }

    /// Insert a product.
    ///
    /// # Panics
    ///
    /// Panics if the insert fails.
    pub async fn seed_product(
        &self,
        enterprise: i64,
        name: &str,
        price: i64,
        remaining: i64,
    ) -> ProductId {
        sqlx::query_scalar::<_, ProductId>(
            "INSERT INTO shop (name, price, remaining, enterprise_id) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(price)
        .bind(remaining)
        .bind(EnterpriseId::new(enterprise))
        .fetch_one(&self.pool)
        .await
        .expect("seed product")
    }

    /// Balance of `user`.
    ///
    /// # Panics
    ///
    /// Panics if the user does not exist.
    pub async fn balance(&self, user: UserId) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT balance FROM users WHERE id = ?")
            .bind(user)
            .fetch_one(&self.pool)
            .await
            .expect("read balance")
    }

    /// Remaining stock of `product`.
    ///
    /// # Panics
    ///
    /// Panics if the product does not exist.
    pub async fn remaining(&self, product: ProductId) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT remaining FROM shop WHERE id = ?")
            .bind(product)
            .fetch_one(&self.pool)
            .await
            .expect("read stock")
    }
}

/// Gateway that keeps every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl RecordingGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail (messages are still recorded).
    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn messages_to(&self, user: UserId) -> Vec<OutboundMessage> {
        self.messages().into_iter().filter(|m| m.to == user).collect()
    }

    #[must_use]
    pub fn last_to(&self, user: UserId) -> Option<OutboundMessage> {
        self.messages_to(user).pop()
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Gateway for RecordingGateway {
    async fn send(&self, message: OutboundMessage) -> Result<(), GatewayError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);

        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("recording gateway set to fail".to_string()));
        }
        Ok(())
    }
}

/// Dispatcher wired to a [`TestStore`], a [`RecordingGateway`] and a
/// [`ManualClock`].
pub struct Harness {
    pub store: TestStore,
    pub gateway: Arc<RecordingGateway>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: Dispatcher<RecordingGateway>,
}

impl Harness {
    /// Harness with default ledger rules and `super_user` as super user.
    pub async fn new(super_user: i64) -> Self {
        Self::with_rules(super_user, LedgerConfig::default()).await
    }

    pub async fn with_rules(super_user: i64, rules: LedgerConfig) -> Self {
        let store = TestStore::new().await;
        let gateway = Arc::new(RecordingGateway::new());
        let clock = Arc::new(ManualClock::new(START_TIME));

        let state = BotState::new(
            store.pool().clone(),
            Arc::clone(&gateway),
            Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
            rules,
            UserId::new(super_user),
        );

        Self {
            store,
            gateway,
            clock,
            dispatcher: Dispatcher::new(state),
        }
    }

    /// Send free text (a leading `/word` is treated as a command).
    pub async fn say(&self, from: UserId, text: &str) {
        let command = text
            .strip_prefix('/')
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string);

        let event = InboundEvent::Message(TextMessage {
            sender: from,
            username: format!("user{from}"),
            text: text.to_string(),
            command,
        });
        self.dispatcher.handle(event).await;
    }

    /// Press a button; returns the toast.
    pub async fn press(&self, from: UserId, payload: &str) -> Option<String> {
        let event = InboundEvent::Callback(CallbackAction {
            id: format!("cb-{from}"),
            sender: from,
            payload: payload.to_string(),
        });
        self.dispatcher.handle(event).await
    }

    /// Text of the last message sent to `user`, or an empty string.
    #[must_use]
    pub fn last_text(&self, user: UserId) -> String {
        self.gateway
            .last_to(user)
            .map(|m| m.text)
            .unwrap_or_default()
    }
}
