use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_accounting::{AccountCode, JournalRef, NewJournalLine, TaggedOperation};
use tally_core::{Aggregate, AggregateRoot, DomainError, DomainResult, Entity};
use tally_events::Event;
use tally_inventory::InventoryId;

use crate::supplier::SupplierId;

tally_core::numeric_id!(
    /// Purchase identifier.
    PurchaseId(u64),
    "PurchaseId"
);

/// Purchase line. `quantity` is in internal units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub line_number: u32,
    pub inventory_id: InventoryId,
    pub supplier_quantity: i64,
    pub quantity: i64,
    /// Total line cost.
    pub price: i64,
}

/// How one posted line split its price, as settled against the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub line_number: u32,
    pub inventory_account: AccountCode,
    pub price: i64,
    pub catchup: i64,
}

/// Journal lines for a posted purchase: inventory accounts take the price net
/// of catch-up, COGS takes the catch-up, accounts payable takes the total.
pub fn purchase_posting_lines(
    purchase_id: PurchaseId,
    receipts: &[PurchaseReceipt],
    role_account: impl Fn(TaggedOperation) -> DomainResult<AccountCode>,
) -> DomainResult<Vec<NewJournalLine>> {
    let reference = format!("purchase:{purchase_id}");
    let mut out = Vec::new();
    let mut total = 0i64;

    for receipt in receipts {
        let description = format!("Purchase line {}", receipt.line_number);
        let stocked = receipt.price - receipt.catchup;
        if stocked > 0 {
            out.push(
                NewJournalLine::debit(receipt.inventory_account, stocked)
                    .with_description(description.clone()),
            );
        }
        if receipt.catchup > 0 {
            out.push(
                NewJournalLine::debit(
                    role_account(TaggedOperation::RecordCostOfGoodsSold)?,
                    receipt.catchup,
                )
                .with_description(description),
            );
        }
        total += receipt.price;
    }

    if total > 0 {
        out.push(NewJournalLine::credit(
            role_account(TaggedOperation::RecordPurchasePayable)?,
            total,
        ));
    }

    Ok(out
        .into_iter()
        .map(|l| l.with_reference(reference.clone()))
        .collect())
}

/// Aggregate root: Purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    id: PurchaseId,
    supplier_id: SupplierId,
    purchase_time: DateTime<Utc>,
    post_time: Option<DateTime<Utc>>,
    journal_entry_ref: Option<JournalRef>,
    lines: Vec<PurchaseLine>,
    discarded: bool,
    version: u64,
    created: bool,
}

impl Purchase {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            supplier_id: SupplierId(0),
            purchase_time: DateTime::<Utc>::UNIX_EPOCH,
            post_time: None,
            journal_entry_ref: None,
            lines: Vec::new(),
            discarded: false,
            version: 0,
            created: false,
        }
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn purchase_time(&self) -> DateTime<Utc> {
        self.purchase_time
    }

    pub fn post_time(&self) -> Option<DateTime<Utc>> {
        self.post_time
    }

    pub fn journal_entry_ref(&self) -> Option<JournalRef> {
        self.journal_entry_ref
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        &self.lines
    }

    pub fn is_posted(&self) -> bool {
        self.post_time.is_some()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn total_amount(&self) -> i64 {
        self.lines.iter().map(|l| l.price).sum()
    }
}

impl Entity for Purchase {
    type Id = PurchaseId;
    const KIND: &'static str = "Purchase";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Purchase {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub supplier_id: SupplierId,
    pub purchase_time: DateTime<Utc>,
}

/// Command: AddPurchaseLine. `conversion` comes from the supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPurchaseLine {
    pub inventory_id: InventoryId,
    pub supplier_quantity: i64,
    pub conversion: i64,
    pub price: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePurchaseLine {
    pub line_number: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPurchase {
    pub post_time: DateTime<Utc>,
    pub journal_entry_ref: Option<JournalRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardPurchase {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseCommand {
    Create(CreatePurchase),
    AddLine(AddPurchaseLine),
    RemoveLine(RemovePurchaseLine),
    Post(PostPurchase),
    Discard(DiscardPurchase),
}

/// Event: PurchaseCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCreated {
    pub purchase_id: PurchaseId,
    pub supplier_id: SupplierId,
    pub purchase_time: DateTime<Utc>,
}

/// Event: PurchaseLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineAdded {
    pub purchase_id: PurchaseId,
    pub line: PurchaseLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseLineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineRemoved {
    pub purchase_id: PurchaseId,
    pub line_number: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchasePosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePosted {
    pub purchase_id: PurchaseId,
    pub post_time: DateTime<Utc>,
    pub journal_entry_ref: Option<JournalRef>,
    pub total_amount: i64,
}

/// Event: PurchaseDiscarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDiscarded {
    pub purchase_id: PurchaseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    PurchaseCreated(PurchaseCreated),
    LineAdded(PurchaseLineAdded),
    LineRemoved(PurchaseLineRemoved),
    PurchasePosted(PurchasePosted),
    PurchaseDiscarded(PurchaseDiscarded),
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::PurchaseCreated(_) => "purchasing.purchase.created",
            PurchaseEvent::LineAdded(_) => "purchasing.purchase.line_added",
            PurchaseEvent::LineRemoved(_) => "purchasing.purchase.line_removed",
            PurchaseEvent::PurchasePosted(_) => "purchasing.purchase.posted",
            PurchaseEvent::PurchaseDiscarded(_) => "purchasing.purchase.discarded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::PurchaseCreated(e) => e.purchase_time,
            PurchaseEvent::LineAdded(e) => e.occurred_at,
            PurchaseEvent::LineRemoved(e) => e.occurred_at,
            PurchaseEvent::PurchasePosted(e) => e.post_time,
            PurchaseEvent::PurchaseDiscarded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::PurchaseCreated(e) => {
                self.supplier_id = e.supplier_id;
                self.purchase_time = e.purchase_time;
                self.created = true;
            }
            PurchaseEvent::LineAdded(e) => self.lines.push(e.line.clone()),
            PurchaseEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_number != e.line_number);
            }
            PurchaseEvent::PurchasePosted(e) => {
                self.post_time = Some(e.post_time);
                self.journal_entry_ref = e.journal_entry_ref;
            }
            PurchaseEvent::PurchaseDiscarded(_) => self.discarded = true,
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::Create(cmd) => self.handle_create(cmd),
            PurchaseCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseCommand::Post(cmd) => self.handle_post(cmd),
            PurchaseCommand::Discard(cmd) => self.handle_discard(cmd),
        }
    }
}

impl Purchase {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created || self.discarded {
            return Err(DomainError::not_found(format!(
                "Purchase {} does not exist",
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

    fn handle_create(&self, cmd: &CreatePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "Purchase {} already exists",
                self.id
            )));
        }
        Ok(vec![PurchaseEvent::PurchaseCreated(PurchaseCreated {
            purchase_id: self.id,
            supplier_id: cmd.supplier_id,
            purchase_time: cmd.purchase_time,
        })])
    }

    fn handle_add_line(&self, cmd: &AddPurchaseLine) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_draft("Cannot add line to a posted purchase")?;
        if cmd.supplier_quantity <= 0 {
            return Err(DomainError::validation("Quantity must be positive"));
        }
        if cmd.conversion <= 0 {
            return Err(DomainError::validation("Conversion factor must be positive"));
        }
        if cmd.price < 0 {
            return Err(DomainError::validation("Price cannot be negative"));
        }
        let quantity = cmd
            .supplier_quantity
            .checked_mul(cmd.conversion)
            .ok_or_else(|| DomainError::validation("Quantity is too large"))?;

        let line_number = self.lines.iter().map(|l| l.line_number).max().unwrap_or(0) + 1;
        Ok(vec![PurchaseEvent::LineAdded(PurchaseLineAdded {
            purchase_id: self.id,
            line: PurchaseLine {
                line_number,
                inventory_id: cmd.inventory_id,
                supplier_quantity: cmd.supplier_quantity,
                quantity,
                price: cmd.price,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(
        &self,
        cmd: &RemovePurchaseLine,
    ) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_draft("Cannot delete line from a posted purchase")?;
        if !self.lines.iter().any(|l| l.line_number == cmd.line_number) {
            return Err(DomainError::not_found(format!(
                "Purchase {} has no line {}",
                self.id, cmd.line_number
            )));
        }
        Ok(vec![PurchaseEvent::LineRemoved(PurchaseLineRemoved {
            purchase_id: self.id,
            line_number: cmd.line_number,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostPurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_draft("Purchase is already posted")?;
        if self.lines.is_empty() {
            return Err(DomainError::validation("Cannot post a purchase without lines"));
        }
        Ok(vec![PurchaseEvent::PurchasePosted(PurchasePosted {
            purchase_id: self.id,
            post_time: cmd.post_time,
            journal_entry_ref: cmd.journal_entry_ref,
            total_amount: self.total_amount(),
        })])
    }

    fn handle_discard(&self, cmd: &DiscardPurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        self.ensure_draft("Cannot discard a posted purchase")?;
        Ok(vec![PurchaseEvent::PurchaseDiscarded(PurchaseDiscarded {
            purchase_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_core::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn draft() -> Purchase {
        let mut purchase = Purchase::empty(PurchaseId(1));
        execute(
            &mut purchase,
            &PurchaseCommand::Create(CreatePurchase {
                supplier_id: SupplierId(1),
                purchase_time: test_time(),
            }),
        )
        .unwrap();
        purchase
    }

    fn add_line(purchase: &mut Purchase, supplier_quantity: i64, conversion: i64, price: i64) {
        execute(
            purchase,
            &PurchaseCommand::AddLine(AddPurchaseLine {
                inventory_id: InventoryId(1),
                supplier_quantity,
                conversion,
                price,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn line_quantity_applies_supplier_conversion() {
        let mut purchase = draft();
        add_line(&mut purchase, 2, 12, 48_000);
        let line = &purchase.lines()[0];
        assert_eq!((line.supplier_quantity, line.quantity), (2, 24));
        assert_eq!(purchase.total_amount(), 48_000);
    }

    #[test]
    fn posted_purchase_is_immutable() {
        let mut purchase = draft();
        add_line(&mut purchase, 1, 1, 1_000);
        execute(
            &mut purchase,
            &PurchaseCommand::Post(PostPurchase {
                post_time: test_time(),
                journal_entry_ref: Some(JournalRef(1)),
            }),
        )
        .unwrap();
        assert!(purchase.is_posted());

        let err = purchase
            .handle(&PurchaseCommand::RemoveLine(RemovePurchaseLine {
                line_number: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.message(), "Cannot delete line from a posted purchase");

        let err = purchase
            .handle(&PurchaseCommand::Discard(DiscardPurchase {
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.message(), "Cannot discard a posted purchase");
    }

    #[test]
    fn empty_purchase_cannot_be_posted() {
        let purchase = draft();
        assert!(purchase
            .handle(&PurchaseCommand::Post(PostPurchase {
                post_time: test_time(),
                journal_entry_ref: None,
            }))
            .is_err());
    }

    fn role_account(operation: TaggedOperation) -> DomainResult<AccountCode> {
        Ok(match operation {
            TaggedOperation::RecordCostOfGoodsSold => AccountCode(51000),
            TaggedOperation::RecordPurchasePayable => AccountCode(21000),
            other => return Err(other.missing_tag()),
        })
    }

    #[test]
    fn posting_lines_split_catchup_to_cogs() {
        let lines = purchase_posting_lines(
            PurchaseId(3),
            &[PurchaseReceipt {
                line_number: 1,
                inventory_account: AccountCode(11400),
                price: 250_000,
                catchup: 62_500,
            }],
            role_account,
        )
        .unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!((lines[0].account_code, lines[0].debit), (AccountCode(11400), 187_500));
        assert_eq!((lines[1].account_code, lines[1].debit), (AccountCode(51000), 62_500));
        assert_eq!((lines[2].account_code, lines[2].credit), (AccountCode(21000), 250_000));
    }

    proptest! {
        #[test]
        fn posting_lines_balance(
            receipts in prop::collection::vec((0i64..1_000_000, 0i64..=100), 1..8)
        ) {
            let receipts: Vec<PurchaseReceipt> = receipts
                .into_iter()
                .enumerate()
                .map(|(i, (price, pct))| PurchaseReceipt {
                    line_number: i as u32 + 1,
                    inventory_account: AccountCode(11400),
                    price,
                    catchup: price * pct / 100,
                })
                .collect();
            let lines = purchase_posting_lines(PurchaseId(1), &receipts, role_account).unwrap();
            let debit: i64 = lines.iter().map(|l| l.debit).sum();
            let credit: i64 = lines.iter().map(|l| l.credit).sum();
            prop_assert_eq!(debit, credit);
        }
    }
}
