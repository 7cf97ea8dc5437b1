//! Account registry (chart of accounts).
//!
//! The chart owns every account, its tags and its running balance. Journal
//! posting goes through [`Chart::post_line`], which is the only way a balance
//! moves.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{DomainError, DomainResult};
use tally_events::Event;

use crate::account::{Account, AccountCode, AccountTag, NormalBalance, TaggedOperation};
use crate::journal::SourceType;

/// Input for [`Chart::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub code: AccountCode,
    pub name: String,
    pub normal_balance: NormalBalance,
    pub is_posting_account: bool,
    pub control_account_code: Option<AccountCode>,
    pub tags: Vec<AccountTag>,
}

impl NewAccount {
    /// A posting account with no parent and no tags.
    pub fn posting(code: u32, name: impl Into<String>, normal_balance: NormalBalance) -> Self {
        Self {
            code: AccountCode(code),
            name: name.into(),
            normal_balance,
            is_posting_account: true,
            control_account_code: None,
            tags: Vec::new(),
        }
    }

    /// A control (aggregator) account.
    pub fn control(code: u32, name: impl Into<String>, normal_balance: NormalBalance) -> Self {
        Self {
            is_posting_account: false,
            ..Self::posting(code, name, normal_balance)
        }
    }

    pub fn under(mut self, control: u32) -> Self {
        self.control_account_code = Some(AccountCode(control));
        self
    }

    pub fn tagged(mut self, tag: AccountTag) -> Self {
        self.tags.push(tag);
        self
    }
}

/// Mutable account attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartEvent {
    AccountCreated {
        code: AccountCode,
        name: String,
        normal_balance: NormalBalance,
        is_posting_account: bool,
        occurred_at: DateTime<Utc>,
    },
    AccountUpdated {
        code: AccountCode,
        name: String,
        is_active: bool,
        occurred_at: DateTime<Utc>,
    },
    AccountTagged {
        code: AccountCode,
        tag: AccountTag,
        occurred_at: DateTime<Utc>,
    },
    AccountUntagged {
        code: AccountCode,
        tag: AccountTag,
        occurred_at: DateTime<Utc>,
    },
}

impl ChartEvent {
    pub fn code(&self) -> AccountCode {
        match self {
            ChartEvent::AccountCreated { code, .. }
            | ChartEvent::AccountUpdated { code, .. }
            | ChartEvent::AccountTagged { code, .. }
            | ChartEvent::AccountUntagged { code, .. } => *code,
        }
    }
}

impl Event for ChartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChartEvent::AccountCreated { .. } => "accounting.account.created",
            ChartEvent::AccountUpdated { .. } => "accounting.account.updated",
            ChartEvent::AccountTagged { .. } => "accounting.account.tagged",
            ChartEvent::AccountUntagged { .. } => "accounting.account.untagged",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ChartEvent::AccountCreated { occurred_at, .. }
            | ChartEvent::AccountUpdated { occurred_at, .. }
            | ChartEvent::AccountTagged { occurred_at, .. }
            | ChartEvent::AccountUntagged { occurred_at, .. } => *occurred_at,
        }
    }
}

/// One trial-balance row (posting accounts with a non-zero balance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub code: AccountCode,
    pub name: String,
    pub debit: i64,
    pub credit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: i64,
    pub total_credit: i64,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    accounts: BTreeMap<AccountCode, Account>,
}

impl Chart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: AccountCode) -> DomainResult<&Account> {
        self.accounts
            .get(&code)
            .ok_or_else(|| DomainError::not_found(format!("Account {code} does not exist")))
    }

    fn get_mut(&mut self, code: AccountCode) -> DomainResult<&mut Account> {
        self.accounts
            .get_mut(&code)
            .ok_or_else(|| DomainError::not_found(format!("Account {code} does not exist")))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn tagged(&self, tag: AccountTag) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(move |a| a.has_tag(tag))
    }

    pub fn create(&mut self, new: NewAccount, at: DateTime<Utc>) -> DomainResult<Vec<ChartEvent>> {
        if self.accounts.contains_key(&new.code) {
            return Err(DomainError::conflict(format!(
                "Account {} already exists",
                new.code
            )));
        }
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("Account name cannot be empty"));
        }
        if let Some(control) = new.control_account_code {
            let parent = self.get(control)?;
            if parent.is_posting_account {
                return Err(DomainError::validation(format!(
                    "Control account {control} must not be a posting account"
                )));
            }
        }

        let code = new.code;
        let mut events = vec![ChartEvent::AccountCreated {
            code,
            name: new.name.clone(),
            normal_balance: new.normal_balance,
            is_posting_account: new.is_posting_account,
            occurred_at: at,
        }];

        self.accounts.insert(
            code,
            Account {
                code,
                name: new.name,
                normal_balance: new.normal_balance,
                balance: 0,
                is_active: true,
                is_posting_account: new.is_posting_account,
                control_account_code: new.control_account_code,
                tags: BTreeSet::new(),
            },
        );

        for tag in new.tags {
            events.extend(self.tag(code, tag, at)?);
        }

        Ok(events)
    }

    pub fn update(
        &mut self,
        code: AccountCode,
        update: AccountUpdate,
        at: DateTime<Utc>,
    ) -> DomainResult<ChartEvent> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("Account name cannot be empty"));
            }
        }

        let account = self.get_mut(code)?;
        if let Some(name) = update.name {
            account.name = name;
        }
        if let Some(is_active) = update.is_active {
            account.is_active = is_active;
        }

        Ok(ChartEvent::AccountUpdated {
            code,
            name: account.name.clone(),
            is_active: account.is_active,
            occurred_at: at,
        })
    }

    /// Assign a tag. For unique tags the previous holder loses it first; its
    /// untag event is part of the result.
    pub fn tag(
        &mut self,
        code: AccountCode,
        tag: AccountTag,
        at: DateTime<Utc>,
    ) -> DomainResult<Vec<ChartEvent>> {
        if self.get(code)?.has_tag(tag) {
            return Ok(vec![]);
        }

        let mut events = Vec::new();
        if tag.is_unique() {
            let previous: Vec<AccountCode> = self.tagged(tag).map(|a| a.code).collect();
            for holder in previous {
                if let Some(account) = self.accounts.get_mut(&holder) {
                    account.tags.remove(&tag);
                }
                events.push(ChartEvent::AccountUntagged {
                    code: holder,
                    tag,
                    occurred_at: at,
                });
            }
        }

        self.get_mut(code)?.tags.insert(tag);
        events.push(ChartEvent::AccountTagged {
            code,
            tag,
            occurred_at: at,
        });
        Ok(events)
    }

    pub fn untag(
        &mut self,
        code: AccountCode,
        tag: AccountTag,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<ChartEvent>> {
        let account = self.get_mut(code)?;
        if !account.tags.remove(&tag) {
            return Ok(None);
        }
        Ok(Some(ChartEvent::AccountUntagged {
            code,
            tag,
            occurred_at: at,
        }))
    }

    pub fn assert_tag(&self, code: AccountCode, tag: AccountTag) -> DomainResult<()> {
        self.get(code)?.assert_tag(tag)
    }

    /// The account must exist and carry the operation's role tag.
    pub fn require_tagged(
        &self,
        code: AccountCode,
        operation: TaggedOperation,
    ) -> DomainResult<&Account> {
        let account = self.get(code)?;
        account.require(operation)?;
        Ok(account)
    }

    /// The single holder of a unique role tag.
    pub fn unique_holder(&self, operation: TaggedOperation) -> DomainResult<&Account> {
        let tag = operation.required_tag();
        self.tagged(tag).next().ok_or_else(|| {
            DomainError::validation(format!("No account is tagged as \"{tag}\""))
        })
    }

    /// Check that a journal line may target `code`.
    pub fn ensure_line_target(&self, code: AccountCode, source: SourceType) -> DomainResult<&Account> {
        let account = self.get(code)?;
        if !account.is_posting_account {
            return Err(DomainError::validation(format!(
                "Account {code} is not a posting account"
            )));
        }
        if !account.is_active {
            return Err(DomainError::validation(format!("Account {code} is inactive")));
        }
        if source == SourceType::Manual {
            if let Some(tag) = account.tags.iter().find(|t| t.rejects_manual_lines()) {
                return Err(DomainError::validation(format!(
                    "Manual journal entry line cannot reference account tagged as \"{tag}\""
                )));
            }
        }
        Ok(account)
    }

    /// Apply one posted journal line to its account balance.
    pub fn post_line(&mut self, code: AccountCode, debit: i64, credit: i64) -> DomainResult<i64> {
        let account = self.get_mut(code)?;
        let delta = account.normal_balance.delta(debit, credit);
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| DomainError::invariant(format!("Account {code} balance overflow")))?;
        Ok(account.balance)
    }

    /// Balance of any account; control accounts sum their descendants,
    /// converting to the control account's normal side.
    pub fn rollup_balance(&self, code: AccountCode) -> DomainResult<i64> {
        let account = self.get(code)?;
        if account.is_posting_account {
            return Ok(account.balance);
        }

        let mut total = 0i64;
        for child in self
            .accounts
            .values()
            .filter(|a| a.control_account_code == Some(code))
        {
            let child_balance = self.rollup_balance(child.code)?;
            if child.normal_balance == account.normal_balance {
                total += child_balance;
            } else {
                total -= child_balance;
            }
        }
        Ok(total)
    }

    pub fn trial_balance(&self) -> TrialBalance {
        let mut tb = TrialBalance::default();
        for account in self.accounts.values().filter(|a| a.is_posting_account) {
            if account.balance == 0 {
                continue;
            }
            let (debit, credit) = match (account.normal_balance, account.balance >= 0) {
                (NormalBalance::Debit, true) => (account.balance, 0),
                (NormalBalance::Debit, false) => (0, -account.balance),
                (NormalBalance::Credit, true) => (0, account.balance),
                (NormalBalance::Credit, false) => (-account.balance, 0),
            };
            tb.total_debit += debit;
            tb.total_credit += credit;
            tb.rows.push(TrialBalanceRow {
                code: account.code,
                name: account.name.clone(),
                debit,
                credit,
            });
        }
        tb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn sample_chart() -> Chart {
        let mut chart = Chart::new();
        chart
            .create(NewAccount::control(10000, "Assets", NormalBalance::Debit), now())
            .unwrap();
        chart
            .create(
                NewAccount::posting(11100, "Cash", NormalBalance::Debit).under(10000),
                now(),
            )
            .unwrap();
        chart
            .create(
                NewAccount::posting(11400, "Inventory", NormalBalance::Debit)
                    .under(10000)
                    .tagged(AccountTag::PosInventory),
                now(),
            )
            .unwrap();
        chart
            .create(
                NewAccount::posting(11900, "Accumulated Depreciation", NormalBalance::Credit)
                    .under(10000)
                    .tagged(AccountTag::ContraAsset),
                now(),
            )
            .unwrap();
        chart
            .create(
                NewAccount::posting(41000, "Sales", NormalBalance::Credit)
                    .tagged(AccountTag::PosSalesRevenue),
                now(),
            )
            .unwrap();
        chart
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let mut chart = sample_chart();
        let err = chart
            .create(NewAccount::posting(11100, "Cash again", NormalBalance::Debit), now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn control_account_must_exist_and_not_be_posting() {
        let mut chart = sample_chart();
        let err = chart
            .create(
                NewAccount::posting(11200, "Bank", NormalBalance::Debit).under(11100),
                now(),
            )
            .unwrap_err();
        assert!(err.message().contains("must not be a posting account"));

        let err = chart
            .create(
                NewAccount::posting(11200, "Bank", NormalBalance::Debit).under(99999),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn unique_tag_moves_to_the_new_holder() {
        let mut chart = sample_chart();
        chart
            .create(NewAccount::posting(42000, "Other Sales", NormalBalance::Credit), now())
            .unwrap();

        let events = chart
            .tag(AccountCode(42000), AccountTag::PosSalesRevenue, now())
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            ChartEvent::AccountUntagged { code: AccountCode(41000), tag: AccountTag::PosSalesRevenue, .. }
        ));
        assert!(!chart.get(AccountCode(41000)).unwrap().has_tag(AccountTag::PosSalesRevenue));
        assert!(chart.get(AccountCode(42000)).unwrap().has_tag(AccountTag::PosSalesRevenue));
        assert_eq!(
            chart.unique_holder(TaggedOperation::RecordSaleRevenue).unwrap().code,
            AccountCode(42000)
        );
    }

    #[test]
    fn non_unique_tags_can_have_many_holders() {
        let mut chart = sample_chart();
        chart
            .create(
                NewAccount::posting(11410, "Inventory B", NormalBalance::Debit)
                    .under(10000)
                    .tagged(AccountTag::PosInventory),
                now(),
            )
            .unwrap();
        assert_eq!(chart.tagged(AccountTag::PosInventory).count(), 2);
    }

    #[test]
    fn tagging_twice_is_a_no_op() {
        let mut chart = sample_chart();
        let events = chart
            .tag(AccountCode(41000), AccountTag::PosSalesRevenue, now())
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn require_tagged_names_the_missing_tag() {
        let chart = sample_chart();
        let err = chart
            .require_tagged(AccountCode(11100), TaggedOperation::CreateInventory)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Inventory account code must be tagged as \"POS - Inventory\""));
        assert!(chart
            .require_tagged(AccountCode(11400), TaggedOperation::CreateInventory)
            .is_ok());
    }

    #[test]
    fn manual_lines_cannot_target_inventory_accounts() {
        let chart = sample_chart();
        let err = chart
            .ensure_line_target(AccountCode(11400), SourceType::Manual)
            .unwrap_err();
        assert!(err.message().contains("\"POS - Inventory\""));
        assert!(chart
            .ensure_line_target(AccountCode(11400), SourceType::System)
            .is_ok());
    }

    #[test]
    fn control_and_inactive_accounts_reject_lines() {
        let mut chart = sample_chart();
        let err = chart
            .ensure_line_target(AccountCode(10000), SourceType::Manual)
            .unwrap_err();
        assert!(err.message().contains("not a posting account"));

        chart
            .update(
                AccountCode(11100),
                AccountUpdate {
                    name: None,
                    is_active: Some(false),
                },
                now(),
            )
            .unwrap();
        let err = chart
            .ensure_line_target(AccountCode(11100), SourceType::Manual)
            .unwrap_err();
        assert!(err.message().contains("inactive"));
    }

    #[test]
    fn rollup_converts_contra_balances() {
        let mut chart = sample_chart();
        chart.post_line(AccountCode(11100), 1_000, 0).unwrap();
        chart.post_line(AccountCode(11400), 500, 0).unwrap();
        chart.post_line(AccountCode(11900), 0, 200).unwrap();

        assert_eq!(chart.get(AccountCode(11900)).unwrap().balance, 200);
        assert_eq!(chart.rollup_balance(AccountCode(10000)).unwrap(), 1_300);
    }

    #[test]
    fn trial_balance_places_balances_on_their_side() {
        let mut chart = sample_chart();
        chart.post_line(AccountCode(11100), 700, 0).unwrap();
        chart.post_line(AccountCode(41000), 0, 700).unwrap();

        let tb = chart.trial_balance();
        assert!(tb.is_balanced());
        assert_eq!(tb.total_debit, 700);
        assert_eq!(tb.rows.len(), 2);
        let sales = tb.rows.iter().find(|r| r.code == AccountCode(41000)).unwrap();
        assert_eq!((sales.debit, sales.credit), (0, 700));
    }
}
