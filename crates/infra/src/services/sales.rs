use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_accounting::{AccountCode, JournalRef, TaggedOperation};
use tally_core::{Aggregate, DomainError};
use tally_inventory::{InventoryCommand, InventoryId, IssueStock};
use tally_sales::{
    AddPayment, AddSaleLine, ApplyDiscount, CreateSale, DiscardSale, Discount, DiscountId,
    PaymentMethod, PaymentMethodId, PostSale, RemovePayment, RemoveSaleLine, Sale, SaleCommand,
    SaleId,
};

use crate::book::Transaction;
use crate::error::BookResult;
use crate::event_log::{INVENTORY, SALE};

/// A complete sale for [`Transaction::record_sale`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub sale_time: DateTime<Utc>,
    pub lines: Vec<NewSaleLine>,
    pub payments: Vec<NewSalePayment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleLine {
    pub inventory_id: InventoryId,
    pub quantity: i64,
    /// Defaults to the inventory's unit price times the quantity.
    pub price: Option<i64>,
    pub discounts: Vec<DiscountId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSalePayment {
    pub payment_method_id: PaymentMethodId,
    pub amount: i64,
}

impl Transaction<'_> {
    pub fn create_discount(
        &mut self,
        name: impl Into<String>,
        inventory_id: Option<InventoryId>,
        multiple_of_quantity: i64,
        amount: i64,
    ) -> BookResult<DiscountId> {
        if let Some(inventory_id) = inventory_id {
            self.state.inventories.get(inventory_id)?;
        }
        let id = DiscountId(self.state.sequences.discount.next_id());
        let discount = Discount::new(id, name, inventory_id, multiple_of_quantity, amount)?;
        self.state.discounts.insert(discount);
        Ok(id)
    }

    pub fn create_payment_method(
        &mut self,
        name: impl Into<String>,
        account_code: AccountCode,
        min_fee: i64,
        max_fee: i64,
        rel_fee: i64,
    ) -> BookResult<PaymentMethodId> {
        self.state
            .chart
            .require_tagged(account_code, TaggedOperation::CreatePaymentMethod)?;

        let id = PaymentMethodId(self.state.sequences.payment_method.next_id());
        let method = PaymentMethod {
            id,
            name: name.into(),
            account_code,
            min_fee,
            max_fee,
            rel_fee,
        };
        method.validate()?;
        self.state.payment_methods.insert(method);
        Ok(id)
    }

    pub fn create_sale(&mut self, sale_time: DateTime<Utc>) -> BookResult<SaleId> {
        let id = SaleId(self.state.sequences.sale.next_id());
        let mut sale = Sale::empty(id);
        self.events
            .dispatch(SALE, &mut sale, &SaleCommand::Create(CreateSale { sale_time }))?;
        self.state.sales.insert(sale);
        Ok(id)
    }

    /// Add a line; its cost is fixed now from the inventory's current average.
    pub fn add_sale_line(
        &mut self,
        sale_id: SaleId,
        inventory_id: InventoryId,
        quantity: i64,
        price: Option<i64>,
    ) -> BookResult<u32> {
        let item = self.state.inventories.get(inventory_id)?;
        let price = match price {
            Some(price) => price,
            None => item.unit_price().checked_mul(quantity).ok_or_else(|| {
                DomainError::validation("Sale line price overflows")
            })?,
        };
        let command = SaleCommand::AddLine(AddSaleLine {
            inventory_id,
            quantity,
            price,
            cost: item.issue_cost(quantity),
            occurred_at: self.now(),
        });

        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;
        Ok(sale.lines().iter().map(|l| l.line_number).max().unwrap_or(0))
    }

    /// Remove a line together with its discounts.
    pub fn remove_sale_line(&mut self, sale_id: SaleId, line_number: u32) -> BookResult<()> {
        let command = SaleCommand::RemoveLine(RemoveSaleLine {
            line_number,
            occurred_at: self.now(),
        });
        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;
        Ok(())
    }

    pub fn apply_sale_discount(
        &mut self,
        sale_id: SaleId,
        line_number: u32,
        discount_id: DiscountId,
    ) -> BookResult<i64> {
        let discount = self.state.discounts.get(discount_id)?.clone();
        let command = SaleCommand::ApplyDiscount(ApplyDiscount {
            line_number,
            discount,
            occurred_at: self.now(),
        });
        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;
        Ok(sale
            .discounts()
            .iter()
            .rev()
            .find(|d| d.line_number == line_number && d.discount_id == discount_id)
            .map(|d| d.amount)
            .unwrap_or(0))
    }

    /// Add a payment; the method's fee is computed now.
    pub fn add_sale_payment(
        &mut self,
        sale_id: SaleId,
        payment_method_id: PaymentMethodId,
        amount: i64,
    ) -> BookResult<u32> {
        let method = self.state.payment_methods.get(payment_method_id)?.clone();
        let command = SaleCommand::AddPayment(AddPayment {
            method,
            amount,
            occurred_at: self.now(),
        });
        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;
        Ok(sale
            .payments()
            .iter()
            .map(|p| p.payment_number)
            .max()
            .unwrap_or(0))
    }

    pub fn remove_sale_payment(&mut self, sale_id: SaleId, payment_number: u32) -> BookResult<()> {
        let command = SaleCommand::RemovePayment(RemovePayment {
            payment_number,
            occurred_at: self.now(),
        });
        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;
        Ok(())
    }

    pub fn discard_sale(&mut self, sale_id: SaleId) -> BookResult<()> {
        let command = SaleCommand::Discard(DiscardSale {
            occurred_at: self.now(),
        });
        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;
        self.state.sales.remove(sale_id)?;
        Ok(())
    }

    /// Insert a sale with its lines, discounts and payments.
    pub fn record_sale(&mut self, new: NewSale) -> BookResult<SaleId> {
        self.atomic(|tx| tx.record_sale_steps(new))
    }

    fn record_sale_steps(&mut self, new: NewSale) -> BookResult<SaleId> {
        let sale_id = self.create_sale(new.sale_time)?;
        for line in new.lines {
            let line_number =
                self.add_sale_line(sale_id, line.inventory_id, line.quantity, line.price)?;
            for discount_id in line.discounts {
                self.apply_sale_discount(sale_id, line_number, discount_id)?;
            }
        }
        for payment in new.payments {
            self.add_sale_payment(sale_id, payment.payment_method_id, payment.amount)?;
        }
        Ok(sale_id)
    }

    /// Post a sale: one system journal entry dated `sale_time`, stock issued
    /// from every line's inventory, the sale frozen.
    pub fn post_sale(
        &mut self,
        sale_id: SaleId,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        self.atomic(|tx| tx.post_sale_steps(sale_id, post_time))
    }

    fn post_sale_steps(
        &mut self,
        sale_id: SaleId,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        let sale = self.state.sales.get(sale_id)?;
        sale.handle(&SaleCommand::Post(PostSale {
            post_time,
            journal_entry_ref: None,
        }))?;
        let sale_time = sale.sale_time();
        self.state.ensure_open_period(sale_time)?;

        let state = &*self.state;
        let lines = sale.posting_lines(
            |op| state.chart.unique_holder(op).map(|a| a.code),
            |method| state.payment_methods.get(method).map(|m| m.account_code),
            |inventory| state.inventories.get(inventory).map(|i| i.account_code()),
        )?;
        let issues: Vec<(InventoryId, i64, i64)> = sale
            .lines()
            .iter()
            .map(|l| (l.inventory_id, l.quantity, l.cost))
            .collect();

        let journal_ref =
            self.system_entry(sale_time, format!("Sale {sale_id}"), lines, post_time)?;

        for (inventory_id, quantity, cost) in issues {
            let command = InventoryCommand::Issue(IssueStock {
                quantity,
                cost,
                occurred_at: post_time,
            });
            let item = self.state.inventories.get_mut(inventory_id)?;
            self.events.dispatch(INVENTORY, item, &command)?;
        }

        let command = SaleCommand::Post(PostSale {
            post_time,
            journal_entry_ref: journal_ref,
        });
        let sale = self.state.sales.get_mut(sale_id)?;
        self.events.dispatch(SALE, sale, &command)?;

        tracing::debug!(%sale_id, ?journal_ref, "sale posted");
        Ok(journal_ref)
    }
}
