//! Infrastructure layer: the transactional book, its services, snapshot
//! persistence, configuration and committed-event publication.

pub mod book;
pub mod config;
pub mod error;
pub mod event_log;
pub mod services;
pub mod snapshot;
pub mod state;
pub mod table;


pub use book::{Book, Envelope, InMemoryBus, Transaction};
pub use config::BookConfig;
pub use error::{BookError, BookResult};
pub use event_log::{EventLog, UncommittedEvent};
pub use services::{NewPurchase, NewPurchaseLine, NewSale, NewSaleLine, NewSalePayment};
pub use snapshot::{InMemorySnapshotStore, JsonFileSnapshotStore, SnapshotStore};
pub use state::{BookState, Sequences};
pub use table::Table;
