//! Domain models for the stock procurement service
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
