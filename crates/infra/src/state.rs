use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_accounting::{Chart, FiscalYear, JournalEntry};
use tally_core::{DomainError, DomainResult, IdSequence};
use tally_inventory::{InventoryItem, StockTaking};
use tally_purchasing::{Purchase, Supplier};
use tally_sales::{Discount, PaymentMethod, Sale};

use crate::table::Table;

/// Id allocators, one per record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequences {
    pub journal: IdSequence,
    pub inventory: IdSequence,
    pub stock_taking: IdSequence,
    pub discount: IdSequence,
    pub payment_method: IdSequence,
    pub supplier: IdSequence,
    pub purchase: IdSequence,
    pub sale: IdSequence,
}

/// Everything the book knows. This is what a snapshot stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookState {
    pub chart: Chart,
    pub journal: Table<JournalEntry>,
    pub fiscal_years: Table<FiscalYear>,
    pub inventories: Table<InventoryItem>,
    pub stock_takings: Table<StockTaking>,
    pub discounts: Table<Discount>,
    pub payment_methods: Table<PaymentMethod>,
    pub suppliers: Table<Supplier>,
    pub purchases: Table<Purchase>,
    pub sales: Table<Sale>,
    pub sequences: Sequences,
    /// Sequence number of the last published event.
    pub last_event_sequence: u64,
}

impl BookState {
    /// The fiscal year containing `time`, if any.
    pub fn fiscal_year_at(&self, time: DateTime<Utc>) -> Option<&FiscalYear> {
        self.fiscal_years.values().find(|fy| fy.contains(time))
    }

    /// Fails when `time` falls inside a closed fiscal year.
    pub fn ensure_open_period(&self, time: DateTime<Utc>) -> DomainResult<()> {
        match self.fiscal_year_at(time) {
            Some(fy) if fy.is_closed() => Err(DomainError::invariant(format!(
                "Cannot post into closed fiscal year beginning {}",
                fy.begin_time()
            ))),
            _ => Ok(()),
        }
    }
}
