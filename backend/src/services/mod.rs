//! Business logic services for the stock procurement service

pub mod catalog;
pub mod history;
pub mod purchase_order;
pub mod stock_ledger;
