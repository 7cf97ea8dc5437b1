//! Events collected while a transaction runs.
//!
//! Typed domain events are serialized into [`UncommittedEvent`]s as soon as
//! they are applied. They only become [`EventEnvelope`]s, with book-wide
//! sequence numbers, once the transaction has committed.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tally_core::{execute, Aggregate, DomainError};
use tally_events::{Event, EventEnvelope};

use crate::error::{BookError, BookResult};

pub const ACCOUNT: &str = "accounting.account";
pub const JOURNAL_ENTRY: &str = "accounting.journal_entry";
pub const FISCAL_YEAR: &str = "accounting.fiscal_year";
pub const INVENTORY: &str = "inventory.item";
pub const SALE: &str = "sales.sale";
pub const PURCHASE: &str = "purchasing.purchase";

/// An event that has been applied to the working state but not yet committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    pub fn from_typed<E>(
        aggregate_type: &str,
        aggregate_id: impl Display,
        event: &E,
    ) -> BookResult<Self>
    where
        E: Event + Serialize,
    {
        let payload =
            serde_json::to_value(event).map_err(|e| BookError::Serialization(e.to_string()))?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }

    pub fn into_envelope(self, sequence_number: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.aggregate_type,
            self.aggregate_id,
            sequence_number,
            self.event_type,
            self.payload,
        )
    }
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<UncommittedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `command` against `aggregate` and record whatever it emits.
    pub fn dispatch<A>(
        &mut self,
        aggregate_type: &str,
        aggregate: &mut A,
        command: &A::Command,
    ) -> BookResult<Vec<A::Event>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize,
    {
        let events = execute(aggregate, command)?;
        self.record(aggregate_type, aggregate.id(), &events)?;
        Ok(events)
    }

    /// Record events produced outside an aggregate (chart changes).
    pub fn record<E>(
        &mut self,
        aggregate_type: &str,
        aggregate_id: impl Display,
        events: &[E],
    ) -> BookResult<()>
    where
        E: Event + Serialize,
    {
        let id = aggregate_id.to_string();
        for event in events {
            self.events
                .push(UncommittedEvent::from_typed(aggregate_type, &id, event)?);
        }
        Ok(())
    }

    /// Forget everything recorded after the first `len` events.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UncommittedEvent> {
        self.events.iter()
    }

    pub fn into_inner(self) -> Vec<UncommittedEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_accounting::{AccountCode, ChartEvent};

    #[test]
    fn recorded_events_keep_their_metadata() {
        let at = Utc::now();
        let mut log = EventLog::new();
        log.record(
            ACCOUNT,
            AccountCode(11100),
            &[ChartEvent::AccountUpdated {
                code: AccountCode(11100),
                name: "Cash".to_string(),
                is_active: false,
                occurred_at: at,
            }],
        )
        .unwrap();

        let event = log.iter().next().unwrap().clone();
        assert_eq!(event.aggregate_type, ACCOUNT);
        assert_eq!(event.aggregate_id, "11100");
        assert_eq!(event.event_type, "accounting.account.updated");
        assert_eq!(event.occurred_at, at);

        let envelope = event.into_envelope(42);
        assert_eq!(envelope.sequence_number(), 42);
        assert_eq!(envelope.payload()["AccountUpdated"]["name"], "Cash");
    }
}
