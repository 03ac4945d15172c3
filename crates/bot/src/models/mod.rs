//! Domain models for the ledger.
//!
//! These are validated domain objects; the repositories map raw rows into
//! them and report malformed rows as `RepositoryError::DataCorruption`.

pub mod order;
pub mod product;
pub mod user;

pub use order::{Decision, Order, OrderDetails, PurchaseRequest, ResolvedOrder};
pub use product::{NewProduct, Product, ProductField};
pub use user::{Correction, CorrectionField, RegistrationProfile, TopUpOutcome, User};
