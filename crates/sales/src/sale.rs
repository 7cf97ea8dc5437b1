use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_accounting::{AccountCode, JournalRef, NewJournalLine, TaggedOperation};
use tally_core::{Aggregate, AggregateRoot, DomainError, DomainResult, Entity};
use tally_events::Event;
use tally_inventory::InventoryId;

use crate::discount::{Discount, DiscountId};
use crate::payment_method::{PaymentMethod, PaymentMethodId};

tally_core::numeric_id!(
    /// Sale identifier.
    SaleId(u64),
    "SaleId"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_number: u32,
    pub inventory_id: InventoryId,
    pub quantity: i64,
    /// Total line price.
    pub price: i64,
    /// Cost of the issued units, fixed when the line was added.
    pub cost: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDiscount {
    pub line_number: u32,
    pub discount_id: DiscountId,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePayment {
    pub payment_number: u32,
    pub payment_method_id: PaymentMethodId,
    pub amount: i64,
    pub payment_fee: i64,
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    id: SaleId,
    sale_time: DateTime<Utc>,
    post_time: Option<DateTime<Utc>>,
    journal_entry_ref: Option<JournalRef>,
    lines: Vec<SaleLine>,
    discounts: Vec<SaleDiscount>,
    payments: Vec<SalePayment>,
    discarded: bool,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            sale_time: DateTime::<Utc>::UNIX_EPOCH,
            post_time: None,
            journal_entry_ref: None,
            lines: Vec::new(),
            discounts: Vec::new(),
            payments: Vec::new(),
            discarded: false,
            version: 0,
            created: false,
        }
    }

    pub fn sale_time(&self) -> DateTime<Utc> {
        self.sale_time
    }

    pub fn post_time(&self) -> Option<DateTime<Utc>> {
        self.post_time
    }

    pub fn journal_entry_ref(&self) -> Option<JournalRef> {
        self.journal_entry_ref
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn line(&self, line_number: u32) -> Option<&SaleLine> {
        self.lines.iter().find(|l| l.line_number == line_number)
    }

    pub fn discounts(&self) -> &[SaleDiscount] {
        &self.discounts
    }

    pub fn payments(&self) -> &[SalePayment] {
        &self.payments
    }

    pub fn is_posted(&self) -> bool {
        self.post_time.is_some()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    // Totals are range-checked when lines, discounts and payments are added,
    // so these sums stay within i64.

    pub fn gross_amount(&self) -> i64 {
        self.lines.iter().map(|l| l.price).sum()
    }

    pub fn discount_amount(&self) -> i64 {
        self.discounts.iter().map(|d| d.amount).sum()
    }

    pub fn fee_amount(&self) -> i64 {
        self.payments.iter().map(|p| p.payment_fee).sum()
    }

    pub fn invoice_amount(&self) -> i64 {
        self.gross_amount() - self.discount_amount()
    }

    pub fn payment_amount(&self) -> i64 {
        self.payments.iter().map(|p| p.amount).sum()
    }

    pub fn cost_amount(&self) -> i64 {
        self.lines.iter().map(|l| l.cost).sum()
    }

    fn line_discount_total(&self, line_number: u32) -> i64 {
        self.discounts
            .iter()
            .filter(|d| d.line_number == line_number)
            .map(|d| d.amount)
            .sum()
    }

    /// Journal lines for posting this sale.
    ///
    /// Payment accounts receive the net of fees, revenue is credited with the
    /// gross amount, and every costed line moves its cost from the inventory
    /// account to COGS. Zero amounts produce no line, and `role_account` is
    /// only asked for the roles this sale actually touches.
    pub fn posting_lines(
        &self,
        role_account: impl Fn(TaggedOperation) -> DomainResult<AccountCode>,
        payment_account: impl Fn(PaymentMethodId) -> DomainResult<AccountCode>,
        inventory_account: impl Fn(InventoryId) -> DomainResult<AccountCode>,
    ) -> DomainResult<Vec<NewJournalLine>> {
        let reference = format!("sale:{}", self.id);
        let mut out = Vec::new();

        for payment in &self.payments {
            let account = payment_account(payment.payment_method_id)?;
            let net = payment.amount - payment.payment_fee;
            if net > 0 {
                out.push(NewJournalLine::debit(account, net));
            } else if net < 0 {
                out.push(NewJournalLine::credit(account, -net));
            }
        }

        let fees = self.fee_amount();
        if fees > 0 {
            out.push(NewJournalLine::debit(
                role_account(TaggedOperation::RecordPaymentFee)?,
                fees,
            ));
        }
        let discounts = self.discount_amount();
        if discounts > 0 {
            out.push(NewJournalLine::debit(
                role_account(TaggedOperation::RecordSaleDiscount)?,
                discounts,
            ));
        }
        let gross = self.gross_amount();
        if gross > 0 {
            out.push(NewJournalLine::credit(
                role_account(TaggedOperation::RecordSaleRevenue)?,
                gross,
            ));
        }

        for line in self.lines.iter().filter(|l| l.cost > 0) {
            let cogs = role_account(TaggedOperation::RecordCostOfGoodsSold)?;
            let inventory = inventory_account(line.inventory_id)?;
            let description = format!("Cost of sale line {}", line.line_number);
            out.push(
                NewJournalLine::debit(cogs, line.cost)
                    .with_description(description.clone()),
            );
            out.push(NewJournalLine::credit(inventory, line.cost).with_description(description));
        }

        Ok(out
            .into_iter()
            .map(|l| l.with_reference(reference.clone()))
            .collect())
    }
}

impl Entity for Sale {
    type Id = SaleId;
    const KIND: &'static str = "Sale";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Sale {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSale {
    pub sale_time: DateTime<Utc>,
}

/// Command: AddSaleLine. Price and cost are resolved by the caller from the
/// inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSaleLine {
    pub inventory_id: InventoryId,
    pub quantity: i64,
    pub price: i64,
    pub cost: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveSaleLine {
    pub line_number: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyDiscount {
    pub line_number: u32,
    pub discount: Discount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPayment {
    pub method: PaymentMethod,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePayment {
    pub payment_number: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSale {
    pub post_time: DateTime<Utc>,
    pub journal_entry_ref: Option<JournalRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardSale {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    Create(CreateSale),
    AddLine(AddSaleLine),
    RemoveLine(RemoveSaleLine),
    ApplyDiscount(ApplyDiscount),
    AddPayment(AddPayment),
    RemovePayment(RemovePayment),
    Post(PostSale),
    Discard(DiscardSale),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    Created {
        sale_id: SaleId,
        sale_time: DateTime<Utc>,
    },
    LineAdded {
        sale_id: SaleId,
        line: SaleLine,
        occurred_at: DateTime<Utc>,
    },
    LineRemoved {
        sale_id: SaleId,
        line_number: u32,
        occurred_at: DateTime<Utc>,
    },
    DiscountApplied {
        sale_id: SaleId,
        discount: SaleDiscount,
        occurred_at: DateTime<Utc>,
    },
    PaymentAdded {
        sale_id: SaleId,
        payment: SalePayment,
        occurred_at: DateTime<Utc>,
    },
    PaymentRemoved {
        sale_id: SaleId,
        payment_number: u32,
        occurred_at: DateTime<Utc>,
    },
    Posted {
        sale_id: SaleId,
        post_time: DateTime<Utc>,
        journal_entry_ref: Option<JournalRef>,
        invoice_amount: i64,
    },
    Discarded {
        sale_id: SaleId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::Created { .. } => "sales.sale.created",
            SaleEvent::LineAdded { .. } => "sales.sale.line_added",
            SaleEvent::LineRemoved { .. } => "sales.sale.line_removed",
            SaleEvent::DiscountApplied { .. } => "sales.sale.discount_applied",
            SaleEvent::PaymentAdded { .. } => "sales.sale.payment_added",
            SaleEvent::PaymentRemoved { .. } => "sales.sale.payment_removed",
            SaleEvent::Posted { .. } => "sales.sale.posted",
            SaleEvent::Discarded { .. } => "sales.sale.discarded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::Created { sale_time, .. } => *sale_time,
            SaleEvent::Posted { post_time, .. } => *post_time,
            SaleEvent::LineAdded { occurred_at, .. }
            | SaleEvent::LineRemoved { occurred_at, .. }
            | SaleEvent::DiscountApplied { occurred_at, .. }
            | SaleEvent::PaymentAdded { occurred_at, .. }
            | SaleEvent::PaymentRemoved { occurred_at, .. }
            | SaleEvent::Discarded { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::Created { sale_time, .. } => {
                self.sale_time = *sale_time;
                self.created = true;
            }
            SaleEvent::LineAdded { line, .. } => self.lines.push(line.clone()),
            SaleEvent::LineRemoved { line_number, .. } => {
                self.lines.retain(|l| l.line_number != *line_number);
                self.discounts.retain(|d| d.line_number != *line_number);
            }
            SaleEvent::DiscountApplied { discount, .. } => self.discounts.push(discount.clone()),
            SaleEvent::PaymentAdded { payment, .. } => self.payments.push(payment.clone()),
            SaleEvent::PaymentRemoved { payment_number, .. } => {
                self.payments.retain(|p| p.payment_number != *payment_number)
            }
            SaleEvent::Posted {
                post_time,
                journal_entry_ref,
                ..
            } => {
                self.post_time = Some(*post_time);
                self.journal_entry_ref = *journal_entry_ref;
            }
            SaleEvent::Discarded { .. } => self.discarded = true,
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::Create(cmd) => self.handle_create(cmd),
            SaleCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SaleCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            SaleCommand::ApplyDiscount(cmd) => self.handle_apply_discount(cmd),
            SaleCommand::AddPayment(cmd) => self.handle_add_payment(cmd),
            SaleCommand::RemovePayment(cmd) => self.handle_remove_payment(cmd),
            SaleCommand::Post(cmd) => self.handle_post(cmd),
            SaleCommand::Discard(cmd) => self.handle_discard(cmd),
        }
    }
}

impl Sale {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created || self.discarded {
            return Err(DomainError::not_found(format!(
                "Sale {} does not exist",
                self.id
            )));
        }
        Ok(())
    }

    fn ensure_draft(&self, message: &str) -> Result<(), DomainError> {
        self.ensure_created()?;
        if self.is_posted() {
            return Err(DomainError::invariant(message));
        }
        Ok(())
    }

    fn checked_total(
        &self,
        what: &str,
        amounts: impl Iterator<Item = i64>,
        added: i64,
    ) -> Result<i64, DomainError> {
        amounts
            .chain(std::iter::once(added))
            .try_fold(0i64, i64::checked_add)
            .ok_or_else(|| DomainError::invariant(format!("Sale {} {what} amount overflow", self.id)))
    }

    fn handle_create(&self, cmd: &CreateSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("Sale {} already exists", self.id)));
        }
        Ok(vec![SaleEvent::Created {
            sale_id: self.id,
            sale_time: cmd.sale_time,
        }])
    }

    fn handle_add_line(&self, cmd: &AddSaleLine) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Cannot add line to a posted sale")?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("Quantity must be positive"));
        }
        if cmd.price < 0 {
            return Err(DomainError::validation("Price cannot be negative"));
        }
        if cmd.cost < 0 {
            return Err(DomainError::validation("Cost cannot be negative"));
        }
        self.checked_total("gross", self.lines.iter().map(|l| l.price), cmd.price)?;
        self.checked_total("cost", self.lines.iter().map(|l| l.cost), cmd.cost)?;

        let line_number = self.lines.iter().map(|l| l.line_number).max().unwrap_or(0) + 1;
        Ok(vec![SaleEvent::LineAdded {
            sale_id: self.id,
            line: SaleLine {
                line_number,
                inventory_id: cmd.inventory_id,
                quantity: cmd.quantity,
                price: cmd.price,
                cost: cmd.cost,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_remove_line(&self, cmd: &RemoveSaleLine) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Cannot delete line from a posted sale")?;
        if self.line(cmd.line_number).is_none() {
            return Err(DomainError::not_found(format!(
                "Sale {} has no line {}",
                self.id, cmd.line_number
            )));
        }
        Ok(vec![SaleEvent::LineRemoved {
            sale_id: self.id,
            line_number: cmd.line_number,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_apply_discount(&self, cmd: &ApplyDiscount) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Cannot apply discount to a posted sale")?;
        let line = self.line(cmd.line_number).ok_or_else(|| {
            DomainError::not_found(format!("Sale {} has no line {}", self.id, cmd.line_number))
        })?;

        cmd.discount.ensure_applicable(line.inventory_id)?;

        if self
            .discounts
            .iter()
            .any(|d| d.line_number == cmd.line_number && d.discount_id == cmd.discount.id)
        {
            return Err(DomainError::conflict(format!(
                "Discount {} is already applied to line {}",
                cmd.discount.id, cmd.line_number
            )));
        }

        let amount = cmd.discount.amount_for(line.quantity);
        let line_total = self
            .line_discount_total(cmd.line_number)
            .checked_add(amount)
            .ok_or_else(|| DomainError::invariant(format!("Sale {} discount overflow", self.id)))?;
        if line_total > line.price {
            return Err(DomainError::validation(
                "Discount amount cannot exceed the line price",
            ));
        }

        Ok(vec![SaleEvent::DiscountApplied {
            sale_id: self.id,
            discount: SaleDiscount {
                line_number: cmd.line_number,
                discount_id: cmd.discount.id,
                amount,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_add_payment(&self, cmd: &AddPayment) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Cannot add payment to a posted sale")?;
        if cmd.amount <= 0 {
            return Err(DomainError::validation("Payment amount must be positive"));
        }
        let payment_fee = cmd.method.fee_for(cmd.amount);
        self.checked_total("payment", self.payments.iter().map(|p| p.amount), cmd.amount)?;
        self.checked_total("fee", self.payments.iter().map(|p| p.payment_fee), payment_fee)?;

        let payment_number = self
            .payments
            .iter()
            .map(|p| p.payment_number)
            .max()
            .unwrap_or(0)
            + 1;
        Ok(vec![SaleEvent::PaymentAdded {
            sale_id: self.id,
            payment: SalePayment {
                payment_number,
                payment_method_id: cmd.method.id,
                amount: cmd.amount,
                payment_fee,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_remove_payment(&self, cmd: &RemovePayment) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Cannot delete payment from a posted sale")?;
        if !self
            .payments
            .iter()
            .any(|p| p.payment_number == cmd.payment_number)
        {
            return Err(DomainError::not_found(format!(
                "Sale {} has no payment {}",
                self.id, cmd.payment_number
            )));
        }
        Ok(vec![SaleEvent::PaymentRemoved {
            sale_id: self.id,
            payment_number: cmd.payment_number,
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_post(&self, cmd: &PostSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Sale is already posted")?;
        if self.lines.is_empty() {
            return Err(DomainError::validation("Cannot post a sale without lines"));
        }
        let invoice = self.invoice_amount();
        let paid = self.payment_amount();
        if paid != invoice {
            return Err(DomainError::validation(format!(
                "Payment amount {paid} does not match invoice amount {invoice}"
            )));
        }
        Ok(vec![SaleEvent::Posted {
            sale_id: self.id,
            post_time: cmd.post_time,
            journal_entry_ref: cmd.journal_entry_ref,
            invoice_amount: invoice,
        }])
    }

    fn handle_discard(&self, cmd: &DiscardSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_draft("Cannot discard a posted sale")?;
        Ok(vec![SaleEvent::Discarded {
            sale_id: self.id,
            occurred_at: cmd.occurred_at,
        }])
    }
}
