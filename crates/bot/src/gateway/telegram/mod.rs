//! Telegram Bot API adapter.
//!
//! Provides the long-polling client that implements [`Gateway`](super::Gateway)
//! and the wire types it exchanges with the Bot API.

mod client;
pub mod types;

pub use client::TelegramClient;
pub use types::{BotCommand, Update};
