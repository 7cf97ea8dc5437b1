//! Inventory domain module.
//!
//! Weighted-average costing with deferred (catch-up) costing of oversold
//! units, plus stock-taking records. Deterministic domain logic only.

pub mod item;
pub mod stock_taking;

pub use item::{
    catchup_cost, cost_of_issue, CountStock, CreateInventory, InventoryCommand, InventoryCreated,
    InventoryEvent, InventoryId, InventoryItem, InventoryUpdated, IssueStock, ReceiveStock,
    StockCounted, StockIssued, StockReceived, UpdateInventory,
};
pub use stock_taking::{StockTaking, StockTakingId};
