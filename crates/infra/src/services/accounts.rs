use tally_accounting::{AccountCode, AccountTag, AccountUpdate, ChartEvent, NewAccount};
use tally_core::DomainError;

use crate::book::Transaction;
use crate::error::BookResult;
use crate::event_log::ACCOUNT;

impl Transaction<'_> {
    pub fn create_account(&mut self, new: NewAccount) -> BookResult<AccountCode> {
        let code = new.code;
        let events = self.state.chart.create(new, self.now())?;
        self.record_chart(&events)?;
        tracing::debug!(%code, "account created");
        Ok(code)
    }

    pub fn update_account(&mut self, code: AccountCode, update: AccountUpdate) -> BookResult<()> {
        let event = self.state.chart.update(code, update, self.now())?;
        self.record_chart(&[event])
    }

    /// Tag an account. For unique role tags, returns the account that held
    /// the tag before.
    pub fn tag_account(
        &mut self,
        code: AccountCode,
        tag: AccountTag,
    ) -> BookResult<Option<AccountCode>> {
        let events = self.state.chart.tag(code, tag, self.now())?;
        let previous = events.iter().find_map(|e| match e {
            ChartEvent::AccountUntagged { code: holder, .. } if *holder != code => Some(*holder),
            _ => None,
        });
        self.record_chart(&events)?;
        Ok(previous)
    }

    /// Remove a tag. Role tags that records still rely on cannot be removed.
    pub fn untag_account(&mut self, code: AccountCode, tag: AccountTag) -> BookResult<()> {
        let in_use = match tag {
            AccountTag::PosInventory => self
                .state
                .inventories
                .values()
                .find(|i| i.account_code() == code)
                .map(|i| format!("inventory \"{}\"", i.name())),
            AccountTag::PosPaymentMethod => self
                .state
                .payment_methods
                .values()
                .find(|m| m.account_code == code)
                .map(|m| format!("payment method \"{}\"", m.name)),
            _ => None,
        };
        if let Some(user) = in_use {
            return Err(DomainError::conflict(format!(
                "Account {code} is tagged as \"{tag}\" for {user}"
            ))
            .into());
        }

        if let Some(event) = self.state.chart.untag(code, tag, self.now())? {
            self.record_chart(&[event])?;
        }
        Ok(())
    }

    fn record_chart(&mut self, events: &[ChartEvent]) -> BookResult<()> {
        for event in events {
            self.events
                .record(ACCOUNT, event.code(), std::slice::from_ref(event))?;
        }
        Ok(())
    }
}
