use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_accounting::JournalRef;
use tally_core::{Aggregate, DomainError};
use tally_inventory::{InventoryCommand, InventoryEvent, InventoryId, ReceiveStock};
use tally_purchasing::{
    purchase_posting_lines, AddPurchaseLine, CreatePurchase, DiscardPurchase, PostPurchase,
    Purchase, PurchaseCommand, PurchaseId, PurchaseReceipt, RemovePurchaseLine, Supplier,
    SupplierId,
};

use crate::book::Transaction;
use crate::error::BookResult;
use crate::event_log::{INVENTORY, PURCHASE};

/// A complete purchase for [`Transaction::record_purchase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub supplier_id: SupplierId,
    pub purchase_time: DateTime<Utc>,
    pub lines: Vec<NewPurchaseLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseLine {
    pub inventory_id: InventoryId,
    /// In the supplier's units.
    pub supplier_quantity: i64,
    pub price: i64,
}

impl Transaction<'_> {
    pub fn create_supplier(
        &mut self,
        name: impl Into<String>,
        phone: Option<String>,
    ) -> BookResult<SupplierId> {
        let id = SupplierId(self.state.sequences.supplier.next_id());
        self.state.suppliers.insert(Supplier::new(id, name, phone)?);
        Ok(id)
    }

    /// Rename a supplier or change its phone number.
    pub fn update_supplier(
        &mut self,
        supplier_id: SupplierId,
        name: Option<String>,
        phone: Option<String>,
    ) -> BookResult<()> {
        let supplier = self.state.suppliers.get_mut(supplier_id)?;
        if let Some(name) = name {
            supplier.rename(name)?;
        }
        if phone.is_some() {
            supplier.phone = phone;
        }
        Ok(())
    }

    /// Internal units per supplier unit for one inventory.
    pub fn set_supplier_conversion(
        &mut self,
        supplier_id: SupplierId,
        inventory_id: InventoryId,
        factor: i64,
    ) -> BookResult<()> {
        self.state.inventories.get(inventory_id)?;
        self.state
            .suppliers
            .get_mut(supplier_id)?
            .set_conversion(inventory_id, factor)?;
        Ok(())
    }

    pub fn create_purchase(
        &mut self,
        supplier_id: SupplierId,
        purchase_time: DateTime<Utc>,
    ) -> BookResult<PurchaseId> {
        self.state.suppliers.get(supplier_id)?;

        let id = PurchaseId(self.state.sequences.purchase.next_id());
        let mut purchase = Purchase::empty(id);
        let command = PurchaseCommand::Create(CreatePurchase {
            supplier_id,
            purchase_time,
        });
        self.events.dispatch(PURCHASE, &mut purchase, &command)?;
        self.state.purchases.insert(purchase);
        Ok(id)
    }

    pub fn add_purchase_line(
        &mut self,
        purchase_id: PurchaseId,
        inventory_id: InventoryId,
        supplier_quantity: i64,
        price: i64,
    ) -> BookResult<u32> {
        self.state.inventories.get(inventory_id)?;
        let supplier_id = self.state.purchases.get(purchase_id)?.supplier_id();
        let conversion = self
            .state
            .suppliers
            .get(supplier_id)?
            .conversion_for(inventory_id);

        let command = PurchaseCommand::AddLine(AddPurchaseLine {
            inventory_id,
            supplier_quantity,
            conversion,
            price,
            occurred_at: self.now(),
        });
        let purchase = self.state.purchases.get_mut(purchase_id)?;
        self.events.dispatch(PURCHASE, purchase, &command)?;
        Ok(purchase
            .lines()
            .iter()
            .map(|l| l.line_number)
            .max()
            .unwrap_or(0))
    }

    pub fn remove_purchase_line(&mut self, purchase_id: PurchaseId, line_number: u32) -> BookResult<()> {
        let command = PurchaseCommand::RemoveLine(RemovePurchaseLine {
            line_number,
            occurred_at: self.now(),
        });
        let purchase = self.state.purchases.get_mut(purchase_id)?;
        self.events.dispatch(PURCHASE, purchase, &command)?;
        Ok(())
    }

    pub fn discard_purchase(&mut self, purchase_id: PurchaseId) -> BookResult<()> {
        let command = PurchaseCommand::Discard(DiscardPurchase {
            occurred_at: self.now(),
        });
        let purchase = self.state.purchases.get_mut(purchase_id)?;
        self.events.dispatch(PURCHASE, purchase, &command)?;
        self.state.purchases.remove(purchase_id)?;
        Ok(())
    }

    pub fn record_purchase(&mut self, new: NewPurchase) -> BookResult<PurchaseId> {
        self.atomic(|tx| tx.record_purchase_steps(new))
    }

    fn record_purchase_steps(&mut self, new: NewPurchase) -> BookResult<PurchaseId> {
        let purchase_id = self.create_purchase(new.supplier_id, new.purchase_time)?;
        for line in new.lines {
            self.add_purchase_line(
                purchase_id,
                line.inventory_id,
                line.supplier_quantity,
                line.price,
            )?;
        }
        Ok(purchase_id)
    }

    /// Post a purchase. Lines are received in order, so two lines of the same
    /// inventory settle its oversold units only once. The journal entry is
    /// dated `purchase_time`.
    pub fn post_purchase(
        &mut self,
        purchase_id: PurchaseId,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        self.atomic(|tx| tx.post_purchase_steps(purchase_id, post_time))
    }

    fn post_purchase_steps(
        &mut self,
        purchase_id: PurchaseId,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        let purchase = self.state.purchases.get(purchase_id)?;
        purchase.handle(&PurchaseCommand::Post(PostPurchase {
            post_time,
            journal_entry_ref: None,
        }))?;
        let purchase_time = purchase.purchase_time();
        self.state.ensure_open_period(purchase_time)?;
        let lines = purchase.lines().to_vec();

        let mut receipts = Vec::with_capacity(lines.len());
        for line in lines {
            let command = InventoryCommand::Receive(ReceiveStock {
                quantity: line.quantity,
                price: line.price,
                occurred_at: post_time,
            });
            let item = self.state.inventories.get_mut(line.inventory_id)?;
            let events = self.events.dispatch(INVENTORY, item, &command)?;
            let catchup = events
                .iter()
                .find_map(|e| match e {
                    InventoryEvent::Received(received) => Some(received.catchup),
                    _ => None,
                })
                .ok_or_else(|| DomainError::invariant("Stock receipt produced no receipt event"))?;
            receipts.push(PurchaseReceipt {
                line_number: line.line_number,
                inventory_account: item.account_code(),
                price: line.price,
                catchup,
            });
        }

        let chart = &self.state.chart;
        let journal_lines = purchase_posting_lines(purchase_id, &receipts, |op| {
            chart.unique_holder(op).map(|a| a.code)
        })?;
        let journal_ref = self.system_entry(
            purchase_time,
            format!("Purchase {purchase_id}"),
            journal_lines,
            post_time,
        )?;

        let command = PurchaseCommand::Post(PostPurchase {
            post_time,
            journal_entry_ref: journal_ref,
        });
        let purchase = self.state.purchases.get_mut(purchase_id)?;
        self.events.dispatch(PURCHASE, purchase, &command)?;

        tracing::debug!(%purchase_id, ?journal_ref, "purchase posted");
        Ok(journal_ref)
    }
}
