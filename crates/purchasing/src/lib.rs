//! Purchasing domain module.
//!
//! Suppliers (with unit conversions) and purchases that restock inventory.
//! Deterministic domain logic only.

pub mod purchase;
pub mod supplier;

pub use purchase::{
    purchase_posting_lines, AddPurchaseLine, CreatePurchase, DiscardPurchase, PostPurchase,
    Purchase, PurchaseCommand, PurchaseCreated, PurchaseDiscarded, PurchaseEvent, PurchaseId,
    PurchaseLine, PurchaseLineAdded, PurchaseLineRemoved, PurchasePosted, PurchaseReceipt,
    RemovePurchaseLine,
};
pub use supplier::{Supplier, SupplierId};
