//! The transactional book.
//!
//! ```text
//! Book::transaction(operation, f)
//!   ↓
//! 1. Take the write lock, clone the state
//!   ↓
//! 2. Run `f` against the working copy (services dispatch commands, collect events)
//!   ↓
//! 3. Error?  drop the copy, nothing is visible, nothing is published
//!   ↓
//! 4. Number the events, save the snapshot (failure rolls back)
//!   ↓
//! 5. Swap the copy in, publish envelopes on the bus
//! ```
//!
//! Publication happens while the write lock is still held so subscribers see
//! transactions in commit order.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use tally_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

use crate::error::{BookError, BookResult};
use crate::event_log::EventLog;
use crate::snapshot::{InMemorySnapshotStore, SnapshotStore};
use crate::state::BookState;

/// Envelope type published for every committed event.
pub type Envelope = EventEnvelope<JsonValue>;

pub type InMemoryBus = Arc<InMemoryEventBus<Envelope>>;

pub struct Book<S = InMemorySnapshotStore, B = InMemoryBus> {
    state: RwLock<BookState>,
    store: S,
    bus: B,
}

impl Book {
    /// Empty book with in-memory persistence and bus.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(BookState::default()),
            store: InMemorySnapshotStore::new(),
            bus: Arc::new(InMemoryEventBus::new()),
        }
    }
}

impl<S, B> Book<S, B>
where
    S: SnapshotStore,
    B: EventBus<Envelope>,
{
    /// Open a book from the store's last snapshot (or empty).
    pub fn open(store: S, bus: B) -> BookResult<Self> {
        let state = store.load()?.unwrap_or_default();
        tracing::info!(
            accounts = state.chart.accounts().count(),
            journal_entries = state.journal.len(),
            last_event_sequence = state.last_event_sequence,
            "book opened"
        );
        Ok(Self {
            state: RwLock::new(state),
            store,
            bus,
        })
    }

    pub fn read<T>(&self, f: impl FnOnce(&BookState) -> T) -> BookResult<T> {
        let guard = self.state.read().map_err(|_| BookError::Poisoned)?;
        Ok(f(&guard))
    }

    /// A copy of the current committed state.
    pub fn snapshot(&self) -> BookResult<BookState> {
        self.read(BookState::clone)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribe to envelopes of transactions committed from now on.
    pub fn subscribe(&self) -> Subscription<Envelope> {
        self.bus.subscribe()
    }

    /// Run `f` as one all-or-nothing unit of work.
    pub fn transaction<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Transaction<'_>) -> BookResult<T>,
    ) -> BookResult<T> {
        let span = tracing::info_span!("book.transaction", operation);
        let _entered = span.enter();

        let mut guard = self.state.write().map_err(|_| BookError::Poisoned)?;
        let mut working = guard.clone();

        let mut tx = Transaction::new(&mut working);
        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "transaction rolled back");
                return Err(err);
            }
        };
        let events = tx.into_events();

        let first = working.last_event_sequence + 1;
        let envelopes: Vec<Envelope> = events
            .into_inner()
            .into_iter()
            .zip(first..)
            .map(|(event, sequence)| event.into_envelope(sequence))
            .collect();
        working.last_event_sequence += envelopes.len() as u64;

        if let Err(err) = self.store.save(&working) {
            tracing::warn!(error = %err, "snapshot save failed; transaction rolled back");
            return Err(err);
        }
        *guard = working;

        for envelope in &envelopes {
            if let Err(err) = self.bus.publish(envelope.clone()) {
                tracing::error!(
                    error = ?err,
                    sequence_number = envelope.sequence_number(),
                    event_type = envelope.event_type(),
                    "publishing committed event failed"
                );
            }
        }
        drop(guard);

        tracing::info!(events = envelopes.len(), "transaction committed");
        Ok(value)
    }
}

/// Working view handed to services inside [`Book::transaction`].
pub struct Transaction<'a> {
    pub(crate) state: &'a mut BookState,
    pub(crate) events: EventLog,
    now: DateTime<Utc>,
}

impl<'a> Transaction<'a> {
    fn new(state: &'a mut BookState) -> Self {
        Self {
            state,
            events: EventLog::new(),
            now: Utc::now(),
        }
    }

    /// State as modified so far by this transaction.
    pub fn state(&self) -> &BookState {
        self.state
    }

    /// Wall-clock time the transaction started; stamps bookkeeping events.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Number of events recorded so far.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Run `f` as one unit inside this transaction. On `Err` the state and
    /// the recorded events are put back as they were before the call, so a
    /// caller may handle the error and keep going.
    pub fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> BookResult<T>) -> BookResult<T> {
        let saved = self.state.clone();
        let mark = self.events.len();
        let result = f(self);
        if result.is_err() {
            *self.state = saved;
            self.events.truncate(mark);
        }
        result
    }

    fn into_events(self) -> EventLog {
        self.events
    }
}
