//! Session persistence.
//!
//! The host keeps its whole login state in `localStorage`, so a session is
//! a snapshot of every storage entry:
//!
//! ```json
//! { "storage": [ { "key": "WASecretBundle", "value": "..." }, ... ] }
//! ```
//!
//! Snapshots are written to a sibling temp file and renamed over the old
//! one, so a crash mid-save never leaves a truncated file behind.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::browser::{PageHandle, StorageEntry};
use crate::config::ensure_dir;
use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// On-disk document.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    storage: Vec<StorageEntry>,
}

/// What [`SessionStore::load`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedSession {
    /// No session file.
    NotFound,
    /// The file exists but is not a snapshot.
    Malformed(String),
    /// The stored entries.
    Entries(Vec<StorageEntry>),
}

/// What [`SessionStore::restore`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing to restore; pair from scratch.
    NotFound,
    /// Unusable file; pair from scratch.
    Malformed,
    /// This many entries were replayed. The page must be reloaded.
    Restored(usize),
}

// ============================================================================
// SessionStore
// ============================================================================

/// Reads and writes the session snapshot file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the snapshot path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the snapshot with `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`] if the file cannot be
    /// written.
    pub fn save(&self, entries: &[StorageEntry]) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(dir)?;

        let json = serde_json::to_vec(&Snapshot {
            storage: entries.to_vec(),
        })?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!(path = %self.path.display(), count = entries.len(), "Session saved");
        Ok(())
    }

    /// Reads the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for read failures other than a missing file.
    pub fn load(&self) -> Result<LoadedSession> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadedSession::NotFound),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) => LoadedSession::Entries(snapshot.storage),
            Err(e) => LoadedSession::Malformed(e.to_string()),
        })
    }

    /// Snapshots the page's storage and saves it.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or the file written.
    pub async fn capture(&self, page: &dyn PageHandle) -> Result<usize> {
        let entries = page.storage_entries().await?;
        self.save(&entries)?;
        info!(path = %self.path.display(), "Session saved");
        Ok(entries.len())
    }

    /// Replays the saved snapshot into the page's storage.
    ///
    /// A missing or malformed file is reported through the outcome, not as
    /// an error, because fresh pairing is always possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the replay fails.
    pub async fn restore(&self, page: &dyn PageHandle) -> Result<RestoreOutcome> {
        match self.load()? {
            LoadedSession::NotFound => {
                warn!(path = %self.path.display(), "No session file found, skipping");
                Ok(RestoreOutcome::NotFound)
            }
            LoadedSession::Malformed(reason) => {
                let err = Error::session_file(&self.path, reason);
                warn!(error = %err, "Failed to restore session");
                Ok(RestoreOutcome::Malformed)
            }
            LoadedSession::Entries(entries) => {
                page.storage_replay(&entries).await?;
                info!(count = entries.len(), "Session loaded");
                Ok(RestoreOutcome::Restored(entries.len()))
            }
        }
    }

    /// Deletes the snapshot. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Session data deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::browser::fake::FakePage;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("data").join("session.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_capture_then_restore_into_empty_storage() {
        let (_dir, store) = store();
        let source = FakePage::new()
            .with_storage("WASecretBundle", "{\"key\":1}")
            .with_storage("logout-token", "tok")
            .with_storage("last-wid", "\"5511@c.us\"");

        assert_eq!(store.capture(&source).await.expect("capture"), 3);

        let target = FakePage::new();
        assert_eq!(
            store.restore(&target).await.expect("restore"),
            RestoreOutcome::Restored(3)
        );

        let before: HashSet<_> = source.storage().into_iter().collect();
        let after: HashSet<_> = target.storage().into_iter().collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, store) = store();
        let page = FakePage::new();
        assert_eq!(store.restore(&page).await.expect("restore"), RestoreOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_malformed_files() {
        let (_dir, store) = store();
        let page = FakePage::new();
        ensure_dir(store.path().parent().expect("parent")).expect("dir");

        for body in ["not json", "{}", r#"{"storage": null}"#, r#"{"storage": [{"key": 1}]}"#] {
            fs::write(store.path(), body).expect("write");
            assert_eq!(
                store.restore(&page).await.expect("restore"),
                RestoreOutcome::Malformed,
                "{body}"
            );
        }
        assert!(page.storage().is_empty());
    }

    #[test]
    fn test_save_replaces_and_clear_removes() {
        let (_dir, store) = store();
        store.save(&[StorageEntry::new("a", "1")]).expect("save");
        store.save(&[StorageEntry::new("b", "2")]).expect("save");

        assert_eq!(
            store.load().expect("load"),
            LoadedSession::Entries(vec![StorageEntry::new("b", "2")])
        );
        assert!(store.clear().expect("clear"));
        assert!(!store.clear().expect("clear again"));
        assert_eq!(store.load().expect("load"), LoadedSession::NotFound);
    }
}
