//! Integration tests for Crewstore.
//!
//! Each test drives the bot's dispatcher end to end, the way the polling
//! runtime does, against a temporary SQLite ledger. Outbound messages are
//! captured by a recording gateway and time is a manual clock.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p crewstore-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `commerce` - purchases, top-ups, order lifecycle
//! - `registration` - `/start`, profile parsing, timeout, approval
//! - `administration` - role gate, role hand-over, corrections, shop editor

use crewstore_bot::db::UserRepository;
use crewstore_bot::models::User;
use crewstore_bot::testing::Harness;
use crewstore_core::UserId;

/// Load a user straight from the store.
///
/// # Panics
///
/// Panics if the lookup fails.
pub async fn user(harness: &Harness, id: UserId) -> Option<User> {
    UserRepository::new(harness.store.pool())
        .get(id)
        .await
        .expect("load user")
}
