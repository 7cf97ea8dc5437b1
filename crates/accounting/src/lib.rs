//! Accounting module: account registry, double-entry journal, fiscal years.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod account;
pub mod chart;
pub mod fiscal;
pub mod journal;

pub use account::{Account, AccountCode, AccountTag, NormalBalance, TaggedOperation};
pub use chart::{AccountUpdate, Chart, ChartEvent, NewAccount, TrialBalance, TrialBalanceRow};
pub use fiscal::{closing_lines, FiscalYear, FiscalYearCommand, FiscalYearEvent};
pub use journal::{
    JournalCommand, JournalEntry, JournalEvent, JournalLine, JournalRef, JournalStatus,
    NewJournalLine, SourceType,
};
