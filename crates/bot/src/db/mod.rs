//! Database operations for the ledger store.
//!
//! # Database: SQLite (`botdata.db` by default)
//!
//! ## Tables
//!
//! - `users` - Chat identities, roles, balances and registration progress
//! - `shop` - Products per enterprise
//! - `orders` - Purchase orders with the product snapshot taken at purchase
//!
//! # Migrations
//!
//! Migrations are stored in `crates/bot/migrations/`, embedded at compile time
//! and applied by [`run_migrations`] on startup.
//!
//! # Concurrency
//!
//! SQLite allows one writer at a time. Connections run in WAL mode with a
//! bounded busy timeout, and [`with_busy_retry`] re-runs a whole transaction a
//! few times when the lock is still contended (including a read transaction
//! that fails to upgrade to a write).

pub mod orders;
pub mod products;
pub mod users;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::{UserRepository, WorkerPage};

/// Attempts after the first one when a transaction fails on a busy database.
const BUSY_RETRIES: u32 = 3;
/// Linear backoff step between busy retries.
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., schedule number taken in the enterprise).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Conditional debit found the balance below the price.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Conditional decrement found no stock left.
    #[error("out of stock")]
    OutOfStock,

    /// Order already left the pending state.
    #[error("order already processed")]
    AlreadyProcessed,
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
    fn conflict_on_unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(what.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a SQLite connection pool for the ledger.
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the database cannot be opened.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history diverged.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Round-trip to the store, used by the readiness probe.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the store is unreachable.
pub async fn ping(pool: &SqlitePool) -> Result<(), RepositoryError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Whether SQLite reported lock contention (`SQLITE_BUSY`/`SQLITE_LOCKED` and
/// their extended codes).
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Run a transaction attempt, retrying it while the database stays busy.
///
/// Each attempt must be self-contained: it opens and commits (or drops) its
/// own transaction, so a retried attempt starts from a clean slate.
pub(crate) async fn with_busy_retry<T, F, Fut>(
    operation: &'static str,
    mut attempt: F,
) -> Result<T, RepositoryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RepositoryError>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(RepositoryError::Database(ref err)) if is_busy(err) && retries < BUSY_RETRIES => {
                retries += 1;
                tracing::warn!(operation, retries, "ledger store busy, retrying transaction");
                tokio::time::sleep(BUSY_BACKOFF * retries).await;
            }
            result => return result,
        }
    }
}
