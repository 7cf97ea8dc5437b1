//! Environment-driven configuration.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `TALLY_SNAPSHOT_PATH` | JSON snapshot file | none (in-memory book) |
//! | `TALLY_LOG_FORMAT` | `json` or `pretty` | `json` |
//! | `TALLY_LOG_FILTER` | `EnvFilter` directive | `RUST_LOG`, then `info` |

use std::path::PathBuf;

use tally_observability::LogFormat;

use crate::error::{BookError, BookResult};
use crate::snapshot::JsonFileSnapshotStore;

pub const SNAPSHOT_PATH_VAR: &str = "TALLY_SNAPSHOT_PATH";
pub const LOG_FORMAT_VAR: &str = "TALLY_LOG_FORMAT";
pub const LOG_FILTER_VAR: &str = "TALLY_LOG_FILTER";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookConfig {
    pub snapshot_path: Option<PathBuf>,
    pub log_format: LogFormat,
    pub log_filter: Option<String>,
}

impl BookConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Invalid values fall back to defaults with a
    /// warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let snapshot_path = lookup(SNAPSHOT_PATH_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let log_format = match lookup(LOG_FORMAT_VAR) {
            Some(raw) => raw.parse().unwrap_or_else(|err: String| {
                tracing::warn!(%err, "{LOG_FORMAT_VAR} is invalid; using json");
                LogFormat::default()
            }),
            None => LogFormat::default(),
        };

        let log_filter = lookup(LOG_FILTER_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            snapshot_path,
            log_format,
            log_filter,
        }
    }

    /// The file store for `snapshot_path`, or `None` for an in-memory book.
    pub fn snapshot_store(&self) -> BookResult<Option<JsonFileSnapshotStore>> {
        match &self.snapshot_path {
            Some(path) if path.is_dir() => Err(BookError::Config(format!(
                "{SNAPSHOT_PATH_VAR} points to a directory: {}",
                path.display()
            ))),
            Some(path) => Ok(Some(JsonFileSnapshotStore::new(path))),
            None => Ok(None),
        }
    }
}
