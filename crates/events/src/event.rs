//! The contract every record change implements.

use chrono::{DateTime, Utc};

/// A fact about one record: emitted by a command, applied to produce the
/// record's next state, and published once its transaction commits.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted `<area>.<record>.<change>` name, e.g. `"sales.sale.posted"`.
    /// Subscribers route on it, so it never changes once released.
    fn event_type(&self) -> &'static str;

    /// Payload schema version, bumped when the serialized shape changes.
    fn version(&self) -> u32 {
        1
    }

    /// Business time of the change (not the commit time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
