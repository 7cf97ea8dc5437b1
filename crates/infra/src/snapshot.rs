//! Snapshot persistence for the book state.
//!
//! A snapshot is written after every committed transaction. If the write
//! fails the transaction is rolled back, so the stored snapshot never lags
//! behind what readers have seen.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{BookError, BookResult};
use crate::state::BookState;

pub trait SnapshotStore: Send + Sync {
    /// The last saved state, or `None` for a fresh book.
    fn load(&self) -> BookResult<Option<BookState>>;

    fn save(&self, state: &BookState) -> BookResult<()>;
}

impl<S> SnapshotStore for Arc<S>
where
    S: SnapshotStore + ?Sized,
{
    fn load(&self) -> BookResult<Option<BookState>> {
        (**self).load()
    }

    fn save(&self, state: &BookState) -> BookResult<()> {
        (**self).save(state)
    }
}

/// Keeps the last saved state in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    inner: Mutex<Option<BookState>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self) -> BookResult<Option<BookState>> {
        let guard = self.inner.lock().map_err(|_| BookError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, state: &BookState) -> BookResult<()> {
        let mut guard = self.inner.lock().map_err(|_| BookError::Poisoned)?;
        *guard = Some(state.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file. Saves go to a sibling temp file that is then
/// renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn load(&self) -> BookResult<Option<BookState>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BookError::Snapshot(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            BookError::Snapshot(format!("parsing {}: {e}", self.path.display()))
        })
    }

    fn save(&self, state: &BookState) -> BookResult<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| BookError::Snapshot(format!("encoding snapshot: {e}")))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                BookError::Snapshot(format!("creating {}: {e}", dir.display()))
            })?;
        }

        let temp = self.temp_path();
        fs::write(&temp, bytes)
            .map_err(|e| BookError::Snapshot(format!("writing {}: {e}", temp.display())))?;
        fs::rename(&temp, &self.path).map_err(|e| {
            BookError::Snapshot(format!("replacing {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("tally-snapshot-{}-{name}", uuid::Uuid::now_v7()))
            .join("book.json")
    }

    #[test]
    fn missing_file_loads_as_fresh_book() {
        let store = JsonFileSnapshotStore::new(scratch_path("missing"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn saved_state_loads_back() {
        let path = scratch_path("roundtrip");
        let store = JsonFileSnapshotStore::new(&path);

        let mut state = BookState::default();
        state.last_event_sequence = 17;
        state.sequences.sale.next_id();
        store.save(&state).unwrap();

        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap(), Some(state));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_a_snapshot_error() {
        let path = scratch_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileSnapshotStore::new(&path).load().unwrap_err();
        assert!(matches!(err, BookError::Snapshot(_)));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
