//! Crewstore bot library.
//!
//! A chat-driven storefront and workforce ledger: identities register into
//! an enterprise, workers spend a point balance in the enterprise shop,
//! managers top balances up under a cooldown, and the admin fulfils orders.
//!
//! The crate is a library so the integration tests can drive the dispatcher
//! against a temporary store; `main.rs` wires it to Telegram.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod config;
pub mod conversation;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod menu;
pub mod models;
pub mod runtime;
pub mod services;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
