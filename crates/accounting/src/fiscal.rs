//! Fiscal years and the year-end closing computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, DomainError, Entity};
use tally_events::Event;

use crate::account::AccountCode;
use crate::journal::{JournalRef, NewJournalLine};

/// Aggregate root: a fiscal year, keyed by its begin time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYear {
    begin_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    post_time: Option<DateTime<Utc>>,
    closing_journal_entry_ref: Option<JournalRef>,
    reversal_time: Option<DateTime<Utc>>,
    reversal_journal_entry_ref: Option<JournalRef>,
    version: u64,
    created: bool,
}

impl FiscalYear {
    pub fn empty(begin_time: DateTime<Utc>) -> Self {
        Self {
            begin_time,
            end_time: begin_time,
            post_time: None,
            closing_journal_entry_ref: None,
            reversal_time: None,
            reversal_journal_entry_ref: None,
            version: 0,
            created: false,
        }
    }

    pub fn begin_time(&self) -> DateTime<Utc> {
        self.begin_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn post_time(&self) -> Option<DateTime<Utc>> {
        self.post_time
    }

    pub fn closing_journal_entry_ref(&self) -> Option<JournalRef> {
        self.closing_journal_entry_ref
    }

    pub fn reversal_time(&self) -> Option<DateTime<Utc>> {
        self.reversal_time
    }

    pub fn reversal_journal_entry_ref(&self) -> Option<JournalRef> {
        self.reversal_journal_entry_ref
    }

    /// Closed and not reopened.
    pub fn is_closed(&self) -> bool {
        self.post_time.is_some() && self.reversal_time.is_none()
    }

    /// Inclusive on both ends.
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.begin_time <= time && time <= self.end_time
    }

    pub fn overlaps(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.begin_time <= end && begin <= self.end_time
    }
}

impl Entity for FiscalYear {
    type Id = DateTime<Utc>;
    const KIND: &'static str = "Fiscal year";

    fn id(&self) -> &Self::Id {
        &self.begin_time
    }
}

impl AggregateRoot for FiscalYear {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Fiscal year commands. Cross-record facts (inventories with negative stock,
/// drafts inside the period, the closing entry) are gathered by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalYearCommand {
    Define {
        end_time: DateTime<Utc>,
    },
    Close {
        post_time: DateTime<Utc>,
        closing_ref: Option<JournalRef>,
        /// Name of an inventory with negative stock, if any.
        negative_stock: Option<String>,
        unposted_entries: usize,
    },
    Reopen {
        reversal_time: DateTime<Utc>,
        reversal_ref: Option<JournalRef>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalYearEvent {
    Defined {
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    Closed {
        begin_time: DateTime<Utc>,
        post_time: DateTime<Utc>,
        closing_ref: Option<JournalRef>,
    },
    Reopened {
        begin_time: DateTime<Utc>,
        reversal_time: DateTime<Utc>,
        reversal_ref: Option<JournalRef>,
    },
}

impl Event for FiscalYearEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FiscalYearEvent::Defined { .. } => "accounting.fiscal_year.defined",
            FiscalYearEvent::Closed { .. } => "accounting.fiscal_year.closed",
            FiscalYearEvent::Reopened { .. } => "accounting.fiscal_year.reopened",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FiscalYearEvent::Defined { begin_time, .. } => *begin_time,
            FiscalYearEvent::Closed { post_time, .. } => *post_time,
            FiscalYearEvent::Reopened { reversal_time, .. } => *reversal_time,
        }
    }
}

impl Aggregate for FiscalYear {
    type Command = FiscalYearCommand;
    type Event = FiscalYearEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FiscalYearEvent::Defined { end_time, .. } => {
                self.end_time = *end_time;
                self.created = true;
            }
            FiscalYearEvent::Closed {
                post_time,
                closing_ref,
                ..
            } => {
                self.post_time = Some(*post_time);
                self.closing_journal_entry_ref = *closing_ref;
                self.reversal_time = None;
                self.reversal_journal_entry_ref = None;
            }
            FiscalYearEvent::Reopened {
                reversal_time,
                reversal_ref,
                ..
            } => {
                self.reversal_time = Some(*reversal_time);
                self.reversal_journal_entry_ref = *reversal_ref;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FiscalYearCommand::Define { end_time } => {
                if self.created {
                    return Err(DomainError::conflict(format!(
                        "Fiscal year beginning {} already exists",
                        self.begin_time
                    )));
                }
                if *end_time <= self.begin_time {
                    return Err(DomainError::validation(
                        "Fiscal year end time must be after its begin time",
                    ));
                }
                Ok(vec![FiscalYearEvent::Defined {
                    begin_time: self.begin_time,
                    end_time: *end_time,
                }])
            }
            FiscalYearCommand::Close {
                post_time,
                closing_ref,
                negative_stock,
                unposted_entries,
            } => {
                self.ensure_created()?;
                if self.is_closed() {
                    return Err(DomainError::invariant("Fiscal year is already closed"));
                }
                if let Some(name) = negative_stock {
                    return Err(DomainError::invariant(format!(
                        "Cannot close fiscal year while inventory \"{name}\" has negative stock"
                    )));
                }
                if *unposted_entries > 0 {
                    return Err(DomainError::invariant(format!(
                        "Cannot close fiscal year while {unposted_entries} journal entries in the period are unposted"
                    )));
                }
                Ok(vec![FiscalYearEvent::Closed {
                    begin_time: self.begin_time,
                    post_time: *post_time,
                    closing_ref: *closing_ref,
                }])
            }
            FiscalYearCommand::Reopen {
                reversal_time,
                reversal_ref,
            } => {
                self.ensure_created()?;
                if !self.is_closed() {
                    return Err(DomainError::invariant("Fiscal year is not closed"));
                }
                Ok(vec![FiscalYearEvent::Reopened {
                    begin_time: self.begin_time,
                    reversal_time: *reversal_time,
                    reversal_ref: *reversal_ref,
                }])
            }
        }
    }
}

impl FiscalYear {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!(
                "Fiscal year beginning {} does not exist",
                self.begin_time
            )));
        }
        Ok(())
    }
}

/// Closing entry lines.
///
/// `activity` is the net debit (Σ debit − Σ credit) posted to each sweep
/// account during the period. Each non-zero account is zeroed against
/// `retained_earning`, which absorbs the total.
pub fn closing_lines(
    activity: impl IntoIterator<Item = (AccountCode, i64)>,
    retained_earning: AccountCode,
) -> Vec<NewJournalLine> {
    let mut lines = Vec::new();
    let mut net: i64 = 0;

    for (code, net_debit) in activity {
        if net_debit > 0 {
            lines.push(NewJournalLine::credit(code, net_debit).with_description("Fiscal year closing"));
        } else if net_debit < 0 {
            lines.push(NewJournalLine::debit(code, -net_debit).with_description("Fiscal year closing"));
        } else {
            continue;
        }
        net += net_debit;
    }

    if net > 0 {
        lines.push(NewJournalLine::debit(retained_earning, net).with_description("Fiscal year closing"));
    } else if net < 0 {
        lines.push(NewJournalLine::credit(retained_earning, -net).with_description("Fiscal year closing"));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tally_core::execute;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn defined() -> FiscalYear {
        let mut year = FiscalYear::empty(at(2024, 1, 1));
        execute(
            &mut year,
            &FiscalYearCommand::Define {
                end_time: at(2024, 12, 31),
            },
        )
        .unwrap();
        year
    }

    fn close(ref_: u64) -> FiscalYearCommand {
        FiscalYearCommand::Close {
            post_time: at(2025, 1, 5),
            closing_ref: Some(JournalRef(ref_)),
            negative_stock: None,
            unposted_entries: 0,
        }
    }

    #[test]
    fn end_must_follow_begin() {
        let year = FiscalYear::empty(at(2024, 1, 1));
        let err = year
            .handle(&FiscalYearCommand::Define {
                end_time: at(2023, 12, 31),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn contains_and_overlaps_are_inclusive() {
        let year = defined();
        assert!(year.contains(at(2024, 1, 1)));
        assert!(year.contains(at(2024, 12, 31)));
        assert!(!year.contains(at(2025, 1, 1)));
        assert!(year.overlaps(at(2024, 12, 31), at(2025, 12, 31)));
        assert!(!year.overlaps(at(2025, 1, 1), at(2025, 12, 31)));
    }

    #[test]
    fn negative_stock_blocks_closing() {
        let year = defined();
        let err = year
            .handle(&FiscalYearCommand::Close {
                post_time: at(2025, 1, 5),
                closing_ref: None,
                negative_stock: Some("Widget".to_string()),
                unposted_entries: 0,
            })
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Cannot close fiscal year while inventory \"Widget\" has negative stock"
        );
    }

    #[test]
    fn unposted_entries_block_closing() {
        let year = defined();
        let err = year
            .handle(&FiscalYearCommand::Close {
                post_time: at(2025, 1, 5),
                closing_ref: None,
                negative_stock: None,
                unposted_entries: 2,
            })
            .unwrap_err();
        assert!(err.message().contains("unposted"));
    }

    #[test]
    fn close_reopen_close_cycle() {
        let mut year = defined();
        execute(&mut year, &close(10)).unwrap();
        assert!(year.is_closed());
        assert!(year.handle(&close(11)).is_err());

        execute(
            &mut year,
            &FiscalYearCommand::Reopen {
                reversal_time: at(2025, 2, 1),
                reversal_ref: Some(JournalRef(12)),
            },
        )
        .unwrap();
        assert!(!year.is_closed());
        assert_eq!(year.reversal_journal_entry_ref(), Some(JournalRef(12)));

        execute(&mut year, &close(13)).unwrap();
        assert!(year.is_closed());
        assert_eq!(year.closing_journal_entry_ref(), Some(JournalRef(13)));
        assert_eq!(year.reversal_time(), None);
        assert_eq!(year.reversal_journal_entry_ref(), None);
    }

    #[test]
    fn reopening_an_open_year_fails() {
        let year = defined();
        assert!(year
            .handle(&FiscalYearCommand::Reopen {
                reversal_time: at(2025, 2, 1),
                reversal_ref: None,
            })
            .is_err());
    }

    #[test]
    fn closing_lines_sweep_into_retained_earning() {
        let revenue = AccountCode(41000);
        let expense = AccountCode(51000);
        let retained = AccountCode(32000);

        // Revenue earned 500 (net credit), expense incurred 300 (net debit).
        let lines = closing_lines([(revenue, -500), (expense, 300)], retained);

        assert_eq!(lines.len(), 3);
        assert_eq!((lines[0].account_code, lines[0].debit), (revenue, 500));
        assert_eq!((lines[1].account_code, lines[1].credit), (expense, 300));
        assert_eq!((lines[2].account_code, lines[2].credit), (retained, 200));
    }

    #[test]
    fn closing_lines_skip_zero_activity() {
        let lines = closing_lines([(AccountCode(41000), 0)], AccountCode(32000));
        assert!(lines.is_empty());
    }

    proptest! {
        /// The closing entry always balances.
        #[test]
        fn closing_lines_are_balanced(
            activity in prop::collection::vec(-1_000_000i64..1_000_000i64, 0..12)
        ) {
            let lines = closing_lines(
                activity.iter().enumerate().map(|(i, a)| (AccountCode(40000 + i as u32), *a)),
                AccountCode(32000),
            );
            let debit: i64 = lines.iter().map(|l| l.debit).sum();
            let credit: i64 = lines.iter().map(|l| l.credit).sum();
            prop_assert_eq!(debit, credit);
            prop_assert!(lines.iter().all(|l| l.debit >= 0 && l.credit >= 0));
        }
    }
}
