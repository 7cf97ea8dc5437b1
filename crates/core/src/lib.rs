//! `tally-core`: domain building blocks.
//!
//! Pure domain primitives with no infrastructure concerns:
//! the error model, entity/aggregate traits and numeric identifiers.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{execute, Aggregate, AggregateRoot};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::IdSequence;
