//! Domain models for purchasing and stock

mod history;
mod purchase_order;
mod status;
mod stock;
mod user;

pub use history::*;
pub use purchase_order::*;
pub use status::*;
pub use stock::*;
pub use user::*;
