//! Shared types and inventory rules for the inventory tracker
//!
//! This crate holds the domain models and the consistency rules applied to them
//! (pricing, stock effects, relationship projection, inventory recomputation).
//! It performs no I/O; the backend loads and persists the records it operates on.

#[macro_use]
mod macros;

pub mod error;
pub mod models;
pub mod pricing;
pub mod rebuild;
pub mod relationships;
pub mod reports;
pub mod sequence;
pub mod stock;
pub mod types;
pub mod validation;

pub use error::InventoryError;
pub use models::*;
pub use types::*;
pub use validation::*;
