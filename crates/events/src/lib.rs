//! Domain events and their in-process distribution.
//!
//! Every state change in the book is described by a typed event. Events are
//! collected while a transaction runs and published only after it commits, so
//! subscribers never observe rolled-back work.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
