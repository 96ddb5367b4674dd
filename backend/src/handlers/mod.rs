//! HTTP handlers

pub mod health;
pub mod purchase_order;
pub mod stock;

pub use health::*;
pub use purchase_order::*;
pub use stock::*;
