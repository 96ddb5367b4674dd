//! Shared domain for the stock procurement service
//!
//! Purchase order workflow, status derivation and stock ledger arithmetic.
//! Nothing in this crate touches storage; the backend loads an aggregate,
//! calls into it and persists the result.

pub mod error;
pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;
pub mod workflow;

pub use error::*;
pub use ledger::*;
pub use models::*;
pub use types::*;
pub use validation::*;
pub use workflow::*;
