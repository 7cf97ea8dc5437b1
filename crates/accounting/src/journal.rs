use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, DomainError, Entity};
use tally_events::Event;

use crate::account::AccountCode;

tally_core::numeric_id!(
    /// Journal entry reference. Allocated monotonically by the book.
    JournalRef(u64),
    "JournalRef"
);

/// Who produced an entry. System entries come from sale/purchase posting,
/// stock taking, fiscal closing and reversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Manual,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Draft,
    Posted,
    Reversed,
}

/// One side of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// 1-based, unique per entry.
    pub line_number: u32,
    pub account_code: AccountCode,
    pub debit: i64,
    pub credit: i64,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// Journal line input (the entry assigns the line number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalLine {
    pub account_code: AccountCode,
    pub debit: i64,
    pub credit: i64,
    pub description: Option<String>,
    pub reference: Option<String>,
}

impl NewJournalLine {
    pub fn debit(account_code: AccountCode, amount: i64) -> Self {
        Self {
            account_code,
            debit: amount,
            credit: 0,
            description: None,
            reference: None,
        }
    }

    pub fn credit(account_code: AccountCode, amount: i64) -> Self {
        Self {
            account_code,
            debit: 0,
            credit: amount,
            description: None,
            reference: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.debit < 0 || self.credit < 0 {
            return Err(DomainError::validation(
                "Journal line debit and credit cannot be negative",
            ));
        }
        if self.debit == 0 && self.credit == 0 {
            return Err(DomainError::validation(
                "Journal line must have a debit or a credit amount",
            ));
        }
        Ok(())
    }

    fn numbered(&self, line_number: u32) -> JournalLine {
        JournalLine {
            line_number,
            account_code: self.account_code,
            debit: self.debit,
            credit: self.credit,
            description: self.description.clone(),
            reference: self.reference.clone(),
        }
    }
}

/// Aggregate root: one double-entry journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    journal_ref: JournalRef,
    entry_time: DateTime<Utc>,
    note: Option<String>,
    source_type: SourceType,
    post_time: Option<DateTime<Utc>>,
    reversal_of_ref: Option<JournalRef>,
    reversed_by_ref: Option<JournalRef>,
    lines: Vec<JournalLine>,
    discarded: bool,
    version: u64,
    created: bool,
}

impl JournalEntry {
    /// Empty aggregate, before `Draft` is applied.
    pub fn empty(journal_ref: JournalRef) -> Self {
        Self {
            journal_ref,
            entry_time: DateTime::<Utc>::UNIX_EPOCH,
            note: None,
            source_type: SourceType::Manual,
            post_time: None,
            reversal_of_ref: None,
            reversed_by_ref: None,
            lines: Vec::new(),
            discarded: false,
            version: 0,
            created: false,
        }
    }

    pub fn journal_ref(&self) -> JournalRef {
        self.journal_ref
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn post_time(&self) -> Option<DateTime<Utc>> {
        self.post_time
    }

    pub fn reversal_of_ref(&self) -> Option<JournalRef> {
        self.reversal_of_ref
    }

    pub fn reversed_by_ref(&self) -> Option<JournalRef> {
        self.reversed_by_ref
    }

    pub fn lines(&self) -> &[JournalLine] {
        &self.lines
    }

    pub fn is_posted(&self) -> bool {
        self.post_time.is_some()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn status(&self) -> JournalStatus {
        match (self.post_time, self.reversed_by_ref) {
            (None, _) => JournalStatus::Draft,
            (Some(_), None) => JournalStatus::Posted,
            (Some(_), Some(_)) => JournalStatus::Reversed,
        }
    }

    /// (Σ debit, Σ credit).
    pub fn totals(&self) -> (i64, i64) {
        self.lines
            .iter()
            .fold((0, 0), |(d, c), l| (d + l.debit, c + l.credit))
    }

    /// The lines of this entry with debit and credit swapped.
    pub fn reversal_lines(&self) -> Vec<NewJournalLine> {
        self.lines
            .iter()
            .map(|l| NewJournalLine {
                account_code: l.account_code,
                debit: l.credit,
                credit: l.debit,
                description: l.description.clone(),
                reference: l.reference.clone(),
            })
            .collect()
    }

    fn next_line_number(&self) -> u32 {
        self.lines.iter().map(|l| l.line_number).max().unwrap_or(0) + 1
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created || self.discarded {
            return Err(DomainError::not_found(format!(
                "Journal entry {} does not exist",
                self.journal_ref
            )));
        }
        Ok(())
    }

    fn ensure_draft(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        if self.is_posted() {
            return Err(DomainError::invariant("Cannot modify a posted journal entry"));
        }
        Ok(())
    }
}

impl Entity for JournalEntry {
    type Id = JournalRef;
    const KIND: &'static str = "Journal entry";

    fn id(&self) -> &Self::Id {
        &self.journal_ref
    }
}

impl AggregateRoot for JournalEntry {
    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    Draft {
        entry_time: DateTime<Utc>,
        note: Option<String>,
        source_type: SourceType,
        reversal_of_ref: Option<JournalRef>,
        lines: Vec<NewJournalLine>,
    },
    AddLine {
        line: NewJournalLine,
        at: DateTime<Utc>,
    },
    RemoveLine {
        line_number: u32,
        at: DateTime<Utc>,
    },
    Post {
        post_time: DateTime<Utc>,
    },
    MarkReversed {
        reversed_by: JournalRef,
        at: DateTime<Utc>,
    },
    Discard {
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    Drafted {
        journal_ref: JournalRef,
        entry_time: DateTime<Utc>,
        note: Option<String>,
        source_type: SourceType,
        reversal_of_ref: Option<JournalRef>,
        lines: Vec<JournalLine>,
    },
    LineAdded {
        journal_ref: JournalRef,
        line: JournalLine,
        occurred_at: DateTime<Utc>,
    },
    LineRemoved {
        journal_ref: JournalRef,
        line_number: u32,
        occurred_at: DateTime<Utc>,
    },
    Posted {
        journal_ref: JournalRef,
        post_time: DateTime<Utc>,
        amount: i64,
    },
    Reversed {
        journal_ref: JournalRef,
        reversed_by: JournalRef,
        occurred_at: DateTime<Utc>,
    },
    Discarded {
        journal_ref: JournalRef,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::Drafted { .. } => "accounting.journal.drafted",
            JournalEvent::LineAdded { .. } => "accounting.journal.line_added",
            JournalEvent::LineRemoved { .. } => "accounting.journal.line_removed",
            JournalEvent::Posted { .. } => "accounting.journal.posted",
            JournalEvent::Reversed { .. } => "accounting.journal.reversed",
            JournalEvent::Discarded { .. } => "accounting.journal.discarded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::Drafted { entry_time, .. } => *entry_time,
            JournalEvent::Posted { post_time, .. } => *post_time,
            JournalEvent::LineAdded { occurred_at, .. }
            | JournalEvent::LineRemoved { occurred_at, .. }
            | JournalEvent::Reversed { occurred_at, .. }
            | JournalEvent::Discarded { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::Drafted {
                entry_time,
                note,
                source_type,
                reversal_of_ref,
                lines,
                ..
            } => {
                self.entry_time = *entry_time;
                self.note = note.clone();
                self.source_type = *source_type;
                self.reversal_of_ref = *reversal_of_ref;
                self.lines = lines.clone();
                self.created = true;
            }
            JournalEvent::LineAdded { line, .. } => self.lines.push(line.clone()),
            JournalEvent::LineRemoved { line_number, .. } => {
                self.lines.retain(|l| l.line_number != *line_number)
            }
            JournalEvent::Posted { post_time, .. } => self.post_time = Some(*post_time),
            JournalEvent::Reversed { reversed_by, .. } => self.reversed_by_ref = Some(*reversed_by),
            JournalEvent::Discarded { .. } => self.discarded = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::Draft {
                entry_time,
                note,
                source_type,
                reversal_of_ref,
                lines,
            } => {
                if self.created {
                    return Err(DomainError::conflict(format!(
                        "Journal entry {} already exists",
                        self.journal_ref
                    )));
                }
                let mut numbered = Vec::with_capacity(lines.len());
                for (i, line) in lines.iter().enumerate() {
                    line.validate()?;
                    numbered.push(line.numbered(i as u32 + 1));
                }
                Ok(vec![JournalEvent::Drafted {
                    journal_ref: self.journal_ref,
                    entry_time: *entry_time,
                    note: note.clone(),
                    source_type: *source_type,
                    reversal_of_ref: *reversal_of_ref,
                    lines: numbered,
                }])
            }
            JournalCommand::AddLine { line, at } => {
                self.ensure_draft()?;
                line.validate()?;
                Ok(vec![JournalEvent::LineAdded {
                    journal_ref: self.journal_ref,
                    line: line.numbered(self.next_line_number()),
                    occurred_at: *at,
                }])
            }
            JournalCommand::RemoveLine { line_number, at } => {
                self.ensure_draft()?;
                if !self.lines.iter().any(|l| l.line_number == *line_number) {
                    return Err(DomainError::not_found(format!(
                        "Journal entry {} has no line {}",
                        self.journal_ref, line_number
                    )));
                }
                Ok(vec![JournalEvent::LineRemoved {
                    journal_ref: self.journal_ref,
                    line_number: *line_number,
                    occurred_at: *at,
                }])
            }
            JournalCommand::Post { post_time } => {
                self.ensure_created()?;
                if self.is_posted() {
                    return Err(DomainError::invariant("Journal entry is already posted"));
                }
                if self.lines.is_empty() {
                    return Err(DomainError::validation("Journal entry has no lines"));
                }

                let mut debit_total: i128 = 0;
                let mut credit_total: i128 = 0;
                for line in &self.lines {
                    debit_total += line.debit as i128;
                    credit_total += line.credit as i128;
                }
                if debit_total != credit_total {
                    return Err(DomainError::invariant("Journal entry is not balanced"));
                }
                let amount = i64::try_from(debit_total)
                    .map_err(|_| DomainError::invariant("Journal entry total overflows"))?;

                Ok(vec![JournalEvent::Posted {
                    journal_ref: self.journal_ref,
                    post_time: *post_time,
                    amount,
                }])
            }
            JournalCommand::MarkReversed { reversed_by, at } => {
                self.ensure_created()?;
                if !self.is_posted() {
                    return Err(DomainError::invariant(
                        "Cannot reverse a journal entry that is not posted",
                    ));
                }
                if self.reversed_by_ref.is_some() {
                    return Err(DomainError::invariant(
                        "Journal entry has already been reversed",
                    ));
                }
                if self.reversal_of_ref.is_some() {
                    return Err(DomainError::invariant("Cannot reverse a reversal journal entry"));
                }
                Ok(vec![JournalEvent::Reversed {
                    journal_ref: self.journal_ref,
                    reversed_by: *reversed_by,
                    occurred_at: *at,
                }])
            }
            JournalCommand::Discard { at } => {
                self.ensure_created()?;
                if self.is_posted() {
                    return Err(DomainError::invariant("Cannot discard a posted journal entry"));
                }
                Ok(vec![JournalEvent::Discarded {
                    journal_ref: self.journal_ref,
                    occurred_at: *at,
                }])
            }
        }
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

    fn cash() -> AccountCode {
        AccountCode(11100)
    }

    fn sales() -> AccountCode {
        AccountCode(41000)
    }

    fn drafted(lines: Vec<NewJournalLine>) -> JournalEntry {
        let mut entry = JournalEntry::empty(JournalRef(1));
        execute(
            &mut entry,
            &JournalCommand::Draft {
                entry_time: test_time(),
                note: Some("Test entry".to_string()),
                source_type: SourceType::Manual,
                reversal_of_ref: None,
                lines,
            },
        )
        .unwrap();
        entry
    }

    fn balanced(amount: i64) -> Vec<NewJournalLine> {
        vec![
            NewJournalLine::debit(cash(), amount),
            NewJournalLine::credit(sales(), amount),
        ]
    }

    #[test]
    fn draft_numbers_lines_from_one() {
        let entry = drafted(balanced(100));
        assert_eq!(entry.status(), JournalStatus::Draft);
        let numbers: Vec<u32> = entry.lines().iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(entry.version(), 1);
    }

    #[test]
    fn negative_or_empty_lines_are_rejected() {
        let entry = JournalEntry::empty(JournalRef(1));
        let err = entry
            .handle(&JournalCommand::Draft {
                entry_time: test_time(),
                note: None,
                source_type: SourceType::Manual,
                reversal_of_ref: None,
                lines: vec![NewJournalLine::debit(cash(), -5)],
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let entry = drafted(vec![]);
        let err = entry
            .handle(&JournalCommand::AddLine {
                line: NewJournalLine::debit(cash(), 0),
                at: test_time(),
            })
            .unwrap_err();
        assert!(err.message().contains("debit or a credit"));
    }

    #[test]
    fn added_lines_take_max_plus_one() {
        let mut entry = drafted(balanced(100));
        execute(
            &mut entry,
            &JournalCommand::RemoveLine {
                line_number: 1,
                at: test_time(),
            },
        )
        .unwrap();
        execute(
            &mut entry,
            &JournalCommand::AddLine {
                line: NewJournalLine::debit(cash(), 100),
                at: test_time(),
            },
        )
        .unwrap();
        let numbers: Vec<u32> = entry.lines().iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[test]
    fn unbalanced_entry_is_rejected() {
        let entry = drafted(vec![
            NewJournalLine::debit(cash(), 100),
            NewJournalLine::credit(sales(), 90),
        ]);
        let err = entry
            .handle(&JournalCommand::Post {
                post_time: test_time(),
            })
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg == "Journal entry is not balanced" => {}
            other => panic!("Expected unbalanced rejection, got {other:?}"),
        }
    }

    #[test]
    fn empty_entry_cannot_be_posted() {
        let entry = drafted(vec![]);
        assert!(entry
            .handle(&JournalCommand::Post {
                post_time: test_time()
            })
            .is_err());
    }

    #[test]
    fn posted_entries_are_immutable() {
        let mut entry = drafted(balanced(100));
        execute(
            &mut entry,
            &JournalCommand::Post {
                post_time: test_time(),
            },
        )
        .unwrap();
        assert_eq!(entry.status(), JournalStatus::Posted);

        let err = entry
            .handle(&JournalCommand::RemoveLine {
                line_number: 1,
                at: test_time(),
            })
            .unwrap_err();
        assert_eq!(err.message(), "Cannot modify a posted journal entry");

        let err = entry
            .handle(&JournalCommand::Discard { at: test_time() })
            .unwrap_err();
        assert_eq!(err.message(), "Cannot discard a posted journal entry");
    }

    #[test]
    fn draft_can_be_discarded() {
        let mut entry = drafted(balanced(100));
        execute(&mut entry, &JournalCommand::Discard { at: test_time() }).unwrap();
        assert!(entry.is_discarded());
        assert!(entry
            .handle(&JournalCommand::Post {
                post_time: test_time()
            })
            .is_err());
    }

    #[test]
    fn entry_can_be_reversed_once() {
        let mut entry = drafted(balanced(100));
        execute(
            &mut entry,
            &JournalCommand::Post {
                post_time: test_time(),
            },
        )
        .unwrap();

        let swapped = entry.reversal_lines();
        assert_eq!(swapped[0].credit, 100);
        assert_eq!(swapped[1].debit, 100);

        execute(
            &mut entry,
            &JournalCommand::MarkReversed {
                reversed_by: JournalRef(2),
                at: test_time(),
            },
        )
        .unwrap();
        assert_eq!(entry.status(), JournalStatus::Reversed);

        let err = entry
            .handle(&JournalCommand::MarkReversed {
                reversed_by: JournalRef(3),
                at: test_time(),
            })
            .unwrap_err();
        assert_eq!(err.message(), "Journal entry has already been reversed");
    }

    #[test]
    fn reversal_entries_cannot_be_reversed() {
        let mut entry = JournalEntry::empty(JournalRef(2));
        execute(
            &mut entry,
            &JournalCommand::Draft {
                entry_time: test_time(),
                note: None,
                source_type: SourceType::System,
                reversal_of_ref: Some(JournalRef(1)),
                lines: balanced(10),
            },
        )
        .unwrap();
        execute(
            &mut entry,
            &JournalCommand::Post {
                post_time: test_time(),
            },
        )
        .unwrap();
        assert!(entry
            .handle(&JournalCommand::MarkReversed {
                reversed_by: JournalRef(3),
                at: test_time(),
            })
            .is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Whatever lines a draft holds, posting succeeds exactly when the
        /// debit and credit totals agree.
        #[test]
        fn post_succeeds_iff_balanced(
            debits in prop::collection::vec(1i64..1_000_000i64, 1..8),
            credits in prop::collection::vec(1i64..1_000_000i64, 1..8),
        ) {
            let mut lines: Vec<NewJournalLine> =
                debits.iter().map(|d| NewJournalLine::debit(cash(), *d)).collect();
            lines.extend(credits.iter().map(|c| NewJournalLine::credit(sales(), *c)));
            let entry = drafted(lines);

            let result = entry.handle(&JournalCommand::Post { post_time: test_time() });
            let balanced = debits.iter().sum::<i64>() == credits.iter().sum::<i64>();
            prop_assert_eq!(result.is_ok(), balanced);
        }

        /// Reversal lines cancel the original line by line.
        #[test]
        fn reversal_lines_cancel_the_original(
            amounts in prop::collection::vec(1i64..1_000_000i64, 1..10)
        ) {
            let mut lines = Vec::new();
            for amount in &amounts {
                lines.extend(balanced(*amount));
            }
            let entry = drafted(lines);
            let reversal = entry.reversal_lines();

            prop_assert_eq!(reversal.len(), entry.lines().len());
            for (orig, rev) in entry.lines().iter().zip(&reversal) {
                prop_assert_eq!(orig.account_code, rev.account_code);
                prop_assert_eq!(orig.debit, rev.credit);
                prop_assert_eq!(orig.credit, rev.debit);
            }
        }
    }
}
