use std::sync::Arc;

use anyhow::Context;
use serde_json::json;

use tally_events::{EventBus, InMemoryEventBus};
use tally_infra::{Book, BookConfig, Envelope, SnapshotStore};

fn main() -> anyhow::Result<()> {
    let config = BookConfig::from_env();
    tally_observability::init_with(config.log_format, config.log_filter.as_deref());

    let report = match config.snapshot_store()? {
        Some(store) => {
            tracing::info!(path = %store.path().display(), "opening book from snapshot");
            let book = Book::open(store, Arc::new(InMemoryEventBus::new()))
                .context("failed to open book")?;
            report(&book)?
        }
        None => {
            tracing::warn!("no snapshot configured; reporting on an empty book");
            report(&Book::in_memory())?
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn report<S, B>(book: &Book<S, B>) -> anyhow::Result<serde_json::Value>
where
    S: SnapshotStore,
    B: EventBus<Envelope>,
{
    let value = book.read(|state| {
        json!({
            "trial_balance": state.chart.trial_balance(),
            "inventories": state.inventories,
            "fiscal_years": state.fiscal_years,
            "last_event_sequence": state.last_event_sequence,
        })
    })?;
    Ok(value)
}
