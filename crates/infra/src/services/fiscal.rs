use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tally_accounting::{
    closing_lines, AccountCode, FiscalYear, FiscalYearCommand, JournalRef, TaggedOperation,
};
use tally_core::{Aggregate, DomainError};

use crate::book::Transaction;
use crate::error::BookResult;
use crate::event_log::FISCAL_YEAR;

impl Transaction<'_> {
    pub fn define_fiscal_year(
        &mut self,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BookResult<()> {
        if let Some(other) = self
            .state
            .fiscal_years
            .values()
            .find(|fy| fy.overlaps(begin_time, end_time))
        {
            return Err(DomainError::conflict(format!(
                "Fiscal year overlaps fiscal year beginning {}",
                other.begin_time()
            ))
            .into());
        }

        let mut year = FiscalYear::empty(begin_time);
        self.events
            .dispatch(FISCAL_YEAR, &mut year, &FiscalYearCommand::Define { end_time })?;
        self.state.fiscal_years.insert(year);
        Ok(())
    }

    /// Close a fiscal year: sweep the period's activity on revenue, expense
    /// and dividend accounts into retained earnings with a system entry dated
    /// `end_time`, then lock the period.
    pub fn close_fiscal_year(
        &mut self,
        begin_time: DateTime<Utc>,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        self.atomic(|tx| tx.close_fiscal_year_steps(begin_time, post_time))
    }

    fn close_fiscal_year_steps(
        &mut self,
        begin_time: DateTime<Utc>,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        let year = self.state.fiscal_years.get(begin_time)?;
        let end_time = year.end_time();

        let negative_stock = self
            .state
            .inventories
            .values()
            .find(|i| i.stock() < 0)
            .map(|i| i.name().to_string());
        let unposted_entries = self
            .state
            .journal
            .values()
            .filter(|e| !e.is_posted() && year.contains(e.entry_time()))
            .count();
        year.handle(&FiscalYearCommand::Close {
            post_time,
            closing_ref: None,
            negative_stock,
            unposted_entries,
        })?;

        let mut activity: BTreeMap<AccountCode, i64> = BTreeMap::new();
        for entry in self
            .state
            .journal
            .values()
            .filter(|e| e.is_posted() && year.contains(e.entry_time()))
        {
            for line in entry.lines() {
                let account = self.state.chart.get(line.account_code)?;
                if account.tags.iter().any(|t| t.is_closing_sweep()) {
                    *activity.entry(line.account_code).or_default() += line.debit - line.credit;
                }
            }
        }

        let lines = if activity.values().any(|net| *net != 0) {
            let retained = self
                .state
                .chart
                .unique_holder(TaggedOperation::CloseToRetainedEarning)?
                .code;
            closing_lines(activity, retained)
        } else {
            Vec::new()
        };

        let closing_ref = self.system_entry(
            end_time,
            format!("Fiscal year closing {begin_time}"),
            lines,
            post_time,
        )?;

        let command = FiscalYearCommand::Close {
            post_time,
            closing_ref,
            negative_stock: None,
            unposted_entries: 0,
        };
        let year = self.state.fiscal_years.get_mut(begin_time)?;
        self.events.dispatch(FISCAL_YEAR, year, &command)?;

        tracing::info!(%begin_time, ?closing_ref, "fiscal year closed");
        Ok(closing_ref)
    }

    /// Reopen a closed year. The closing entry is reversed with a reversal
    /// dated the year's end, so the period's activity nets back to what it
    /// was before closing.
    pub fn reopen_fiscal_year(
        &mut self,
        begin_time: DateTime<Utc>,
        reversal_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        self.atomic(|tx| tx.reopen_fiscal_year_steps(begin_time, reversal_time))
    }

    fn reopen_fiscal_year_steps(
        &mut self,
        begin_time: DateTime<Utc>,
        reversal_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        let year = self.state.fiscal_years.get(begin_time)?;
        let end_time = year.end_time();
        let closing_ref = year.closing_journal_entry_ref();

        let reversal_ref = closing_ref.map(|_| self.next_journal_ref());
        let command = FiscalYearCommand::Reopen {
            reversal_time,
            reversal_ref,
        };
        let year = self.state.fiscal_years.get_mut(begin_time)?;
        self.events.dispatch(FISCAL_YEAR, year, &command)?;

        if let (Some(closing_ref), Some(reversal_ref)) = (closing_ref, reversal_ref) {
            self.reverse_entry(closing_ref, reversal_ref, end_time, reversal_time)?;
        }

        tracing::info!(%begin_time, ?reversal_ref, "fiscal year reopened");
        Ok(reversal_ref)
    }
}
