use thiserror::Error;

use tally_core::DomainError;

pub type BookResult<T> = Result<T, BookError>;

/// Failure of a book operation.
///
/// Domain failures pass through unchanged so callers can match on the
/// `DomainError` variant and its message.
#[derive(Debug, Error)]
pub enum BookError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Loading or saving the snapshot failed. The transaction was rolled back.
    #[error("snapshot store failed: {0}")]
    Snapshot(String),

    /// An event payload could not be serialized.
    #[error("event serialization failed: {0}")]
    Serialization(String),

    /// A writer panicked while holding the state lock.
    #[error("book state lock poisoned")]
    Poisoned,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BookError {
    /// The domain error, when this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            BookError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Message without the category prefix for domain errors, the display
    /// form otherwise.
    pub fn message(&self) -> String {
        match self {
            BookError::Domain(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_message() {
        let err: BookError = DomainError::invariant("Journal entry is not balanced").into();
        assert_eq!(err.message(), "Journal entry is not balanced");
        assert!(matches!(
            err.domain(),
            Some(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn infrastructure_errors_have_no_domain_part() {
        let err = BookError::Snapshot("disk full".to_string());
        assert!(err.domain().is_none());
        assert_eq!(err.message(), "snapshot store failed: disk full");
    }
}
