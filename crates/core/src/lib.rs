//! Crewstore Core - Shared types library.
//!
//! This crate provides common types used across Crewstore components:
//! - `bot` - Chat-driven storefront and workforce ledger
//! - `integration-tests` - End-to-end scenarios against a temporary store
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs plus role and status enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
