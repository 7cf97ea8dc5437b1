use chrono::{DateTime, Utc};

use tally_accounting::{AccountCode, TaggedOperation};
use tally_core::DomainError;
use tally_inventory::{
    CountStock, CreateInventory, InventoryCommand, InventoryEvent, InventoryId, InventoryItem,
    StockTaking, StockTakingId, UpdateInventory,
};

use crate::book::Transaction;
use crate::error::BookResult;
use crate::event_log::INVENTORY;

impl Transaction<'_> {
    pub fn create_inventory(
        &mut self,
        name: impl Into<String>,
        unit_price: i64,
        account_code: AccountCode,
    ) -> BookResult<InventoryId> {
        self.state
            .chart
            .require_tagged(account_code, TaggedOperation::CreateInventory)?;

        let id = InventoryId(self.state.sequences.inventory.next_id());
        let mut item = InventoryItem::empty(id);
        let command = InventoryCommand::Create(CreateInventory {
            name: name.into(),
            unit_price,
            account_code,
            occurred_at: self.now(),
        });
        self.events.dispatch(INVENTORY, &mut item, &command)?;
        self.state.inventories.insert(item);
        Ok(id)
    }

    /// Rename, reprice or move an inventory to another account. The account
    /// can only change while the inventory holds no stock and no cost.
    pub fn update_inventory(
        &mut self,
        id: InventoryId,
        name: Option<String>,
        unit_price: Option<i64>,
        account_code: Option<AccountCode>,
    ) -> BookResult<()> {
        let item = self.state.inventories.get(id)?;
        if let Some(code) = account_code.filter(|c| *c != item.account_code()) {
            if item.stock() != 0 || item.cost() != 0 {
                return Err(DomainError::invariant(format!(
                    "Cannot move inventory \"{}\" to another account while it holds stock",
                    item.name()
                ))
                .into());
            }
            self.state
                .chart
                .require_tagged(code, TaggedOperation::CreateInventory)?;
        }

        let command = InventoryCommand::Update(UpdateInventory {
            name,
            unit_price,
            account_code,
            occurred_at: self.now(),
        });
        let item = self.state.inventories.get_mut(id)?;
        self.events.dispatch(INVENTORY, item, &command)?;
        Ok(())
    }

    /// Record a physical count. The inventory is set to the counted values
    /// and any cost difference is posted as a gain or shrinkage at
    /// `audit_time`.
    pub fn take_stock(
        &mut self,
        inventory_id: InventoryId,
        actual_stock: i64,
        actual_cost: i64,
        audit_time: DateTime<Utc>,
    ) -> BookResult<StockTakingId> {
        self.atomic(|tx| {
            tx.take_stock_steps(inventory_id, actual_stock, actual_cost, audit_time)
        })
    }

    fn take_stock_steps(
        &mut self,
        inventory_id: InventoryId,
        actual_stock: i64,
        actual_cost: i64,
        audit_time: DateTime<Utc>,
    ) -> BookResult<StockTakingId> {
        self.state.ensure_open_period(audit_time)?;

        let command = InventoryCommand::Count(CountStock {
            actual_stock,
            actual_cost,
            occurred_at: audit_time,
        });
        let item = self.state.inventories.get_mut(inventory_id)?;
        let events = self.events.dispatch(INVENTORY, item, &command)?;
        let inventory_account = item.account_code();
        let inventory_name = item.name().to_string();

        let counted = events
            .iter()
            .find_map(|e| match e {
                InventoryEvent::Counted(counted) => Some(counted),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant("Stock count produced no count event"))?;

        let id = StockTakingId(self.state.sequences.stock_taking.next_id());
        let mut taking = StockTaking::from_count(id, counted);

        let chart = &self.state.chart;
        let lines = taking.adjustment_lines(inventory_account, |op| {
            chart.unique_holder(op).map(|a| a.code)
        })?;
        taking.journal_entry_ref = self.system_entry(
            audit_time,
            format!("Stock taking {id} of \"{inventory_name}\""),
            lines,
            audit_time,
        )?;

        tracing::debug!(
            %inventory_id,
            cost_delta = taking.cost_delta(),
            stock_delta = taking.stock_delta(),
            "stock taken"
        );
        self.state.stock_takings.insert(taking);
        Ok(id)
    }
}
