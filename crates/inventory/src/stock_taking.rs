//! Stock taking: physical counts that true up an inventory's stock and cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_accounting::{AccountCode, JournalRef, NewJournalLine, TaggedOperation};
use tally_core::{DomainResult, Entity};

use crate::item::{InventoryId, StockCounted};

tally_core::numeric_id!(
    /// Stock taking identifier.
    StockTakingId(u64),
    "StockTakingId"
);

/// A completed count. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTaking {
    pub id: StockTakingId,
    pub inventory_id: InventoryId,
    pub audit_time: DateTime<Utc>,
    pub expected_stock: i64,
    pub actual_stock: i64,
    pub expected_cost: i64,
    pub actual_cost: i64,
    /// None when the count matched the book cost.
    pub journal_entry_ref: Option<JournalRef>,
}

impl StockTaking {
    pub fn from_count(id: StockTakingId, counted: &StockCounted) -> Self {
        Self {
            id,
            inventory_id: counted.inventory_id,
            audit_time: counted.occurred_at,
            expected_stock: counted.expected_stock,
            actual_stock: counted.actual_stock,
            expected_cost: counted.expected_cost,
            actual_cost: counted.actual_cost,
            journal_entry_ref: None,
        }
    }

    pub fn stock_delta(&self) -> i64 {
        self.actual_stock - self.expected_stock
    }

    pub fn cost_delta(&self) -> i64 {
        self.actual_cost - self.expected_cost
    }

    /// Adjustment lines: a gain debits inventory against "POS - Inventory
    /// Gain", a loss credits it against "POS - Inventory Shrinkage". Empty when
    /// the cost did not change.
    pub fn adjustment_lines(
        &self,
        inventory_account: AccountCode,
        role_account: impl FnOnce(TaggedOperation) -> DomainResult<AccountCode>,
    ) -> DomainResult<Vec<NewJournalLine>> {
        let delta = self.cost_delta();
        let reference = format!("stock-taking:{}", self.id);
        let lines = if delta > 0 {
            let gain = role_account(TaggedOperation::RecordInventoryGain)?;
            vec![
                NewJournalLine::debit(inventory_account, delta),
                NewJournalLine::credit(gain, delta),
            ]
        } else if delta < 0 {
            let shrinkage = role_account(TaggedOperation::RecordInventoryShrinkage)?;
            vec![
                NewJournalLine::debit(shrinkage, -delta),
                NewJournalLine::credit(inventory_account, -delta),
            ]
        } else {
            Vec::new()
        };
        Ok(lines
            .into_iter()
            .map(|l| l.with_reference(reference.clone()))
            .collect())
    }
}

impl Entity for StockTaking {
    type Id = StockTakingId;
    const KIND: &'static str = "Stock taking";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taking(expected_cost: i64, actual_cost: i64) -> StockTaking {
        StockTaking {
            id: StockTakingId(1),
            inventory_id: InventoryId(1),
            audit_time: Utc::now(),
            expected_stock: 10,
            actual_stock: 9,
            expected_cost,
            actual_cost,
            journal_entry_ref: None,
        }
    }

    const INV: AccountCode = AccountCode(11400);
    const GAIN: AccountCode = AccountCode(42000);
    const SHRINK: AccountCode = AccountCode(52000);

    fn role_account(operation: TaggedOperation) -> DomainResult<AccountCode> {
        match operation {
            TaggedOperation::RecordInventoryGain => Ok(GAIN),
            TaggedOperation::RecordInventoryShrinkage => Ok(SHRINK),
            other => Err(other.missing_tag()),
        }
    }

    #[test]
    fn shrinkage_credits_inventory() {
        let lines = taking(100_000, 90_000).adjustment_lines(INV, role_account).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].account_code, lines[0].debit), (SHRINK, 10_000));
        assert_eq!((lines[1].account_code, lines[1].credit), (INV, 10_000));
    }

    #[test]
    fn gain_debits_inventory() {
        let lines = taking(90_000, 100_000).adjustment_lines(INV, role_account).unwrap();
        assert_eq!((lines[0].account_code, lines[0].debit), (INV, 10_000));
        assert_eq!((lines[1].account_code, lines[1].credit), (GAIN, 10_000));
    }

    #[test]
    fn matching_cost_needs_no_entry() {
        let t = taking(100_000, 100_000);
        assert_eq!(t.stock_delta(), -1);
        assert!(t
            .adjustment_lines(INV, |_| panic!("no account needed"))
            .unwrap()
            .is_empty());
    }
}
