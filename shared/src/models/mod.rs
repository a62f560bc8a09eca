//! Domain models for the inventory tracker

mod asset;
mod item;
mod measurement;
mod purchase;
mod sale;

pub use asset::*;
pub use item::*;
pub use measurement::*;
pub use purchase::*;
pub use sale::*;
