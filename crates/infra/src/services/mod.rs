//! Book operations.
//!
//! Each operation is a method on [`Transaction`](crate::Transaction), so any
//! number of them can be composed inside one `Book::transaction` call and
//! commit or roll back together. An operation that fails leaves the
//! transaction as it found it; multi-step operations run through
//! [`Transaction::atomic`](crate::Transaction::atomic).

mod accounts;
mod fiscal;
mod inventory;
mod journal;
mod purchasing;
mod sales;

pub use purchasing::{NewPurchase, NewPurchaseLine};
pub use sales::{NewSale, NewSaleLine, NewSalePayment};
