use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tally_core::{DomainError, DomainResult};

tally_core::numeric_id!(
    /// Account code. Unique and stable; its ordering encodes the chart hierarchy
    /// (e.g. 11000 "Current Assets" > 11100 "Cash").
    AccountCode(u32),
    "AccountCode"
);

/// The side that increases an account's natural balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl NormalBalance {
    /// Balance delta (in normal-balance terms) caused by a debit/credit pair.
    pub fn delta(self, debit: i64, credit: i64) -> i64 {
        match self {
            NormalBalance::Debit => debit - credit,
            NormalBalance::Credit => credit - debit,
        }
    }
}

/// Recognized account tags.
///
/// Classification tags only drive reporting. Role tags gate behavior: which
/// accounts may back an inventory, a payment method, the closing sweep, and so
/// on. The string form of each tag is stable and appears in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccountTag {
    #[serde(rename = "Asset")]
    Asset,
    #[serde(rename = "Liability")]
    Liability,
    #[serde(rename = "Equity")]
    Equity,
    #[serde(rename = "Revenue")]
    Revenue,
    #[serde(rename = "Expense")]
    Expense,
    #[serde(rename = "Contra Asset")]
    ContraAsset,
    #[serde(rename = "Current Asset")]
    CurrentAsset,
    #[serde(rename = "Non-Current Asset")]
    NonCurrentAsset,
    #[serde(rename = "Current Liability")]
    CurrentLiability,
    #[serde(rename = "Non-Current Liability")]
    NonCurrentLiability,
    #[serde(rename = "POS - Inventory")]
    PosInventory,
    #[serde(rename = "POS - Payment Method")]
    PosPaymentMethod,
    #[serde(rename = "POS - Sales Revenue")]
    PosSalesRevenue,
    #[serde(rename = "POS - Sales Discount")]
    PosSalesDiscount,
    #[serde(rename = "POS - Cost of Goods Sold")]
    PosCostOfGoodsSold,
    #[serde(rename = "POS - Bank Fees")]
    PosBankFees,
    #[serde(rename = "POS - Inventory Gain")]
    PosInventoryGain,
    #[serde(rename = "POS - Inventory Shrinkage")]
    PosInventoryShrinkage,
    #[serde(rename = "POS - Accounts Payable")]
    PosAccountsPayable,
    #[serde(rename = "Fiscal Year Closing - Retained Earning")]
    ClosingRetainedEarning,
    #[serde(rename = "Fiscal Year Closing - Revenue")]
    ClosingRevenue,
    #[serde(rename = "Fiscal Year Closing - Expense")]
    ClosingExpense,
    #[serde(rename = "Fiscal Year Closing - Dividend")]
    ClosingDividend,
}

impl AccountTag {
    pub const ALL: [AccountTag; 23] = [
        AccountTag::Asset,
        AccountTag::Liability,
        AccountTag::Equity,
        AccountTag::Revenue,
        AccountTag::Expense,
        AccountTag::ContraAsset,
        AccountTag::CurrentAsset,
        AccountTag::NonCurrentAsset,
        AccountTag::CurrentLiability,
        AccountTag::NonCurrentLiability,
        AccountTag::PosInventory,
        AccountTag::PosPaymentMethod,
        AccountTag::PosSalesRevenue,
        AccountTag::PosSalesDiscount,
        AccountTag::PosCostOfGoodsSold,
        AccountTag::PosBankFees,
        AccountTag::PosInventoryGain,
        AccountTag::PosInventoryShrinkage,
        AccountTag::PosAccountsPayable,
        AccountTag::ClosingRetainedEarning,
        AccountTag::ClosingRevenue,
        AccountTag::ClosingExpense,
        AccountTag::ClosingDividend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountTag::Asset => "Asset",
            AccountTag::Liability => "Liability",
            AccountTag::Equity => "Equity",
            AccountTag::Revenue => "Revenue",
            AccountTag::Expense => "Expense",
            AccountTag::ContraAsset => "Contra Asset",
            AccountTag::CurrentAsset => "Current Asset",
            AccountTag::NonCurrentAsset => "Non-Current Asset",
            AccountTag::CurrentLiability => "Current Liability",
            AccountTag::NonCurrentLiability => "Non-Current Liability",
            AccountTag::PosInventory => "POS - Inventory",
            AccountTag::PosPaymentMethod => "POS - Payment Method",
            AccountTag::PosSalesRevenue => "POS - Sales Revenue",
            AccountTag::PosSalesDiscount => "POS - Sales Discount",
            AccountTag::PosCostOfGoodsSold => "POS - Cost of Goods Sold",
            AccountTag::PosBankFees => "POS - Bank Fees",
            AccountTag::PosInventoryGain => "POS - Inventory Gain",
            AccountTag::PosInventoryShrinkage => "POS - Inventory Shrinkage",
            AccountTag::PosAccountsPayable => "POS - Accounts Payable",
            AccountTag::ClosingRetainedEarning => "Fiscal Year Closing - Retained Earning",
            AccountTag::ClosingRevenue => "Fiscal Year Closing - Revenue",
            AccountTag::ClosingExpense => "Fiscal Year Closing - Expense",
            AccountTag::ClosingDividend => "Fiscal Year Closing - Dividend",
        }
    }

    /// Unique tags have at most one holder; assigning one moves it.
    pub fn is_unique(self) -> bool {
        matches!(
            self,
            AccountTag::PosSalesRevenue
                | AccountTag::PosSalesDiscount
                | AccountTag::PosCostOfGoodsSold
                | AccountTag::PosBankFees
                | AccountTag::PosInventoryGain
                | AccountTag::PosInventoryShrinkage
                | AccountTag::PosAccountsPayable
                | AccountTag::ClosingRetainedEarning
        )
    }

    /// Accounts with this tag only move through system postings.
    pub fn rejects_manual_lines(self) -> bool {
        matches!(self, AccountTag::PosInventory)
    }

    /// Swept into retained earnings when a fiscal year closes.
    pub fn is_closing_sweep(self) -> bool {
        matches!(
            self,
            AccountTag::ClosingRevenue | AccountTag::ClosingExpense | AccountTag::ClosingDividend
        )
    }
}

impl core::fmt::Display for AccountTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AccountTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown account tag \"{s}\"")))
    }
}

/// Operations gated by an account role.
///
/// This is the role -> operation table: each operation names exactly one tag the
/// target account must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaggedOperation {
    CreateInventory,
    CreatePaymentMethod,
    RecordSaleRevenue,
    RecordSaleDiscount,
    RecordCostOfGoodsSold,
    RecordPaymentFee,
    RecordInventoryGain,
    RecordInventoryShrinkage,
    RecordPurchasePayable,
    CloseToRetainedEarning,
}

impl TaggedOperation {
    pub fn required_tag(self) -> AccountTag {
        match self {
            TaggedOperation::CreateInventory => AccountTag::PosInventory,
            TaggedOperation::CreatePaymentMethod => AccountTag::PosPaymentMethod,
            TaggedOperation::RecordSaleRevenue => AccountTag::PosSalesRevenue,
            TaggedOperation::RecordSaleDiscount => AccountTag::PosSalesDiscount,
            TaggedOperation::RecordCostOfGoodsSold => AccountTag::PosCostOfGoodsSold,
            TaggedOperation::RecordPaymentFee => AccountTag::PosBankFees,
            TaggedOperation::RecordInventoryGain => AccountTag::PosInventoryGain,
            TaggedOperation::RecordInventoryShrinkage => AccountTag::PosInventoryShrinkage,
            TaggedOperation::RecordPurchasePayable => AccountTag::PosAccountsPayable,
            TaggedOperation::CloseToRetainedEarning => AccountTag::ClosingRetainedEarning,
        }
    }

    fn subject(self) -> &'static str {
        match self {
            TaggedOperation::CreateInventory => "Inventory account code",
            TaggedOperation::CreatePaymentMethod => "Payment method account code",
            TaggedOperation::RecordSaleRevenue => "Sales revenue account",
            TaggedOperation::RecordSaleDiscount => "Sales discount account",
            TaggedOperation::RecordCostOfGoodsSold => "Cost of goods sold account",
            TaggedOperation::RecordPaymentFee => "Payment fee account",
            TaggedOperation::RecordInventoryGain => "Inventory gain account",
            TaggedOperation::RecordInventoryShrinkage => "Inventory shrinkage account",
            TaggedOperation::RecordPurchasePayable => "Accounts payable account",
            TaggedOperation::CloseToRetainedEarning => "Retained earning account",
        }
    }

    /// Error raised when the target account lacks the required tag.
    pub fn missing_tag(self) -> DomainError {
        DomainError::validation(format!(
            "{} must be tagged as \"{}\"",
            self.subject(),
            self.required_tag()
        ))
    }
}

/// A chart-of-accounts entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub code: AccountCode,
    pub name: String,
    pub normal_balance: NormalBalance,
    /// Running total in normal-balance terms. Only meaningful for posting
    /// accounts; control accounts are rolled up on read.
    pub balance: i64,
    pub is_active: bool,
    pub is_posting_account: bool,
    pub control_account_code: Option<AccountCode>,
    pub tags: BTreeSet<AccountTag>,
}

impl Account {
    pub fn has_tag(&self, tag: AccountTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn assert_tag(&self, tag: AccountTag) -> DomainResult<()> {
        if self.has_tag(tag) {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "Account {} must be tagged as \"{}\"",
                self.code, tag
            )))
        }
    }

    pub fn require(&self, operation: TaggedOperation) -> DomainResult<()> {
        if self.has_tag(operation.required_tag()) {
            Ok(())
        } else {
            Err(operation.missing_tag())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_strings_round_trip() {
        for tag in AccountTag::ALL {
            let parsed: AccountTag = tag.as_str().parse().unwrap();
            assert_eq!(parsed, tag);
        }
        assert!("POS - Nothing".parse::<AccountTag>().is_err());
    }

    #[test]
    fn tags_serialize_as_their_display_string() {
        for tag in AccountTag::ALL {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag));
        }
    }

    #[test]
    fn missing_tag_message_names_the_tag() {
        let err = TaggedOperation::CreateInventory.missing_tag();
        assert_eq!(
            err.message(),
            "Inventory account code must be tagged as \"POS - Inventory\""
        );
        let err = TaggedOperation::CreatePaymentMethod.missing_tag();
        assert_eq!(
            err.message(),
            "Payment method account code must be tagged as \"POS - Payment Method\""
        );
    }

    #[test]
    fn normal_balance_delta_follows_side() {
        assert_eq!(NormalBalance::Debit.delta(100, 30), 70);
        assert_eq!(NormalBalance::Credit.delta(100, 30), -70);
    }

    #[test]
    fn every_operation_requires_a_role_tag() {
        let ops = [
            TaggedOperation::CreateInventory,
            TaggedOperation::CreatePaymentMethod,
            TaggedOperation::RecordSaleRevenue,
            TaggedOperation::RecordSaleDiscount,
            TaggedOperation::RecordCostOfGoodsSold,
            TaggedOperation::RecordPaymentFee,
            TaggedOperation::RecordInventoryGain,
            TaggedOperation::RecordInventoryShrinkage,
            TaggedOperation::RecordPurchasePayable,
            TaggedOperation::CloseToRetainedEarning,
        ];
        for op in ops {
            let tag = op.required_tag();
            assert!(tag.as_str().starts_with("POS - ") || tag.as_str().starts_with("Fiscal Year Closing - "));
        }
    }
}
