use chrono::{DateTime, Utc};

use tally_accounting::{JournalCommand, JournalEntry, JournalRef, NewJournalLine, SourceType};

use crate::book::Transaction;
use crate::error::BookResult;
use crate::event_log::JOURNAL_ENTRY;

impl Transaction<'_> {
    /// Draft a manual entry. Lines are checked against the chart; the entry
    /// does not need to balance until it is posted.
    pub fn create_journal_entry(
        &mut self,
        entry_time: DateTime<Utc>,
        note: Option<String>,
        lines: Vec<NewJournalLine>,
    ) -> BookResult<JournalRef> {
        self.draft_entry(entry_time, note, SourceType::Manual, None, lines)
    }

    pub fn add_journal_line(
        &mut self,
        journal_ref: JournalRef,
        line: NewJournalLine,
    ) -> BookResult<u32> {
        let source = self.state.journal.get(journal_ref)?.source_type();
        self.state.chart.ensure_line_target(line.account_code, source)?;

        let command = JournalCommand::AddLine {
            line,
            at: self.now(),
        };
        let entry = self.state.journal.get_mut(journal_ref)?;
        self.events.dispatch(JOURNAL_ENTRY, entry, &command)?;
        let line_number = entry.lines().iter().map(|l| l.line_number).max().unwrap_or(0);
        Ok(line_number)
    }

    pub fn remove_journal_line(&mut self, journal_ref: JournalRef, line_number: u32) -> BookResult<()> {
        let command = JournalCommand::RemoveLine {
            line_number,
            at: self.now(),
        };
        let entry = self.state.journal.get_mut(journal_ref)?;
        self.events.dispatch(JOURNAL_ENTRY, entry, &command)?;
        Ok(())
    }

    /// Delete a draft.
    pub fn discard_journal_entry(&mut self, journal_ref: JournalRef) -> BookResult<()> {
        let command = JournalCommand::Discard { at: self.now() };
        let entry = self.state.journal.get_mut(journal_ref)?;
        self.events.dispatch(JOURNAL_ENTRY, entry, &command)?;
        self.state.journal.remove(journal_ref)?;
        Ok(())
    }

    /// Post a draft: it must balance, its accounts must still accept lines
    /// and its entry time must not fall in a closed fiscal year. Each line is
    /// then applied to its account balance.
    pub fn post_journal_entry(
        &mut self,
        journal_ref: JournalRef,
        post_time: DateTime<Utc>,
    ) -> BookResult<()> {
        self.atomic(|tx| tx.post_journal_entry_steps(journal_ref, post_time))
    }

    fn post_journal_entry_steps(
        &mut self,
        journal_ref: JournalRef,
        post_time: DateTime<Utc>,
    ) -> BookResult<()> {
        let entry = self.state.journal.get(journal_ref)?;
        self.state.ensure_open_period(entry.entry_time())?;
        for line in entry.lines() {
            self.state
                .chart
                .ensure_line_target(line.account_code, entry.source_type())?;
        }

        let entry = self.state.journal.get_mut(journal_ref)?;
        self.events
            .dispatch(JOURNAL_ENTRY, entry, &JournalCommand::Post { post_time })?;

        let lines: Vec<_> = entry
            .lines()
            .iter()
            .map(|l| (l.account_code, l.debit, l.credit))
            .collect();
        for (code, debit, credit) in lines {
            self.state.chart.post_line(code, debit, credit)?;
        }
        tracing::debug!(%journal_ref, "journal entry posted");
        Ok(())
    }

    /// Post a system entry that swaps every line of `journal_ref`, and link
    /// the two. Returns the reversal's reference.
    pub fn reverse_journal_entry(
        &mut self,
        journal_ref: JournalRef,
        at: DateTime<Utc>,
    ) -> BookResult<JournalRef> {
        self.atomic(|tx| tx.reverse_journal_entry_steps(journal_ref, at))
    }

    fn reverse_journal_entry_steps(
        &mut self,
        journal_ref: JournalRef,
        at: DateTime<Utc>,
    ) -> BookResult<JournalRef> {
        let reversal_ref = self.next_journal_ref();
        self.reverse_entry(journal_ref, reversal_ref, at, at)?;
        Ok(reversal_ref)
    }

    pub(crate) fn next_journal_ref(&mut self) -> JournalRef {
        JournalRef(self.state.sequences.journal.next_id())
    }

    /// Reverse into `reversal_ref`, dated `entry_time` and posted at
    /// `post_time`.
    pub(crate) fn reverse_entry(
        &mut self,
        journal_ref: JournalRef,
        reversal_ref: JournalRef,
        entry_time: DateTime<Utc>,
        post_time: DateTime<Utc>,
    ) -> BookResult<()> {
        let command = JournalCommand::MarkReversed {
            reversed_by: reversal_ref,
            at: post_time,
        };
        let original = self.state.journal.get_mut(journal_ref)?;
        self.events.dispatch(JOURNAL_ENTRY, original, &command)?;

        let note = Some(format!("Reversal of journal entry {journal_ref}"));
        let lines = original.reversal_lines();
        self.draft_entry_as(
            reversal_ref,
            entry_time,
            note,
            SourceType::System,
            Some(journal_ref),
            lines,
        )?;
        self.post_journal_entry_steps(reversal_ref, post_time)
    }

    /// Draft and post a system entry. Nothing is created when `lines` is
    /// empty.
    pub(crate) fn system_entry(
        &mut self,
        entry_time: DateTime<Utc>,
        note: String,
        lines: Vec<NewJournalLine>,
        post_time: DateTime<Utc>,
    ) -> BookResult<Option<JournalRef>> {
        if lines.is_empty() {
            return Ok(None);
        }
        let journal_ref = self.draft_entry(entry_time, Some(note), SourceType::System, None, lines)?;
        self.post_journal_entry_steps(journal_ref, post_time)?;
        Ok(Some(journal_ref))
    }

    fn draft_entry(
        &mut self,
        entry_time: DateTime<Utc>,
        note: Option<String>,
        source_type: SourceType,
        reversal_of_ref: Option<JournalRef>,
        lines: Vec<NewJournalLine>,
    ) -> BookResult<JournalRef> {
        let journal_ref = self.next_journal_ref();
        self.draft_entry_as(journal_ref, entry_time, note, source_type, reversal_of_ref, lines)?;
        Ok(journal_ref)
    }

    fn draft_entry_as(
        &mut self,
        journal_ref: JournalRef,
        entry_time: DateTime<Utc>,
        note: Option<String>,
        source_type: SourceType,
        reversal_of_ref: Option<JournalRef>,
        lines: Vec<NewJournalLine>,
    ) -> BookResult<()> {
        for line in &lines {
            self.state.chart.ensure_line_target(line.account_code, source_type)?;
        }

        let mut entry = JournalEntry::empty(journal_ref);
        let command = JournalCommand::Draft {
            entry_time,
            note,
            source_type,
            reversal_of_ref,
            lines,
        };
        self.events.dispatch(JOURNAL_ENTRY, &mut entry, &command)?;
        self.state.journal.insert(entry);
        Ok(())
    }
}
