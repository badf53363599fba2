//! `localStorage` access.

use serde_json::Value;
use tracing::debug;

use crate::browser::StorageEntry;
use crate::error::{Error, Result};

use super::{Page, js_literal};

// ============================================================================
// Scripts
// ============================================================================

/// Snapshot of every entry, in `Object.keys` order.
const ENTRIES_SCRIPT: &str = "return Object.keys(window.localStorage)\
     .map(key => ({key, value: window.localStorage.getItem(key)}));";

// ============================================================================
// Page - Storage
// ============================================================================

impl Page {
    /// Gets a value from `localStorage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script fails.
    pub async fn storage_get(&self, key: &str) -> Result<Option<String>> {
        let script = format!("return window.localStorage.getItem({});", js_literal(key)?);
        let value = self.evaluate(&script).await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Reads every `localStorage` entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the page returns a malformed list.
    pub async fn storage_entries(&self) -> Result<Vec<StorageEntry>> {
        let value = self.evaluate(ENTRIES_SCRIPT).await?;
        let entries: Vec<StorageEntry> = match value {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other).map_err(Error::Json)?,
        };

        debug!(tab_id = %self.tab_id(), count = entries.len(), "Read localStorage");
        Ok(entries)
    }

    /// Writes every entry into `localStorage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script fails.
    pub async fn storage_replay(&self, entries: &[StorageEntry]) -> Result<()> {
        let script = format!(
            "for (const e of {}) window.localStorage.setItem(e.key, e.value);",
            js_literal(entries)?
        );
        self.evaluate(&script).await?;

        debug!(tab_id = %self.tab_id(), count = entries.len(), "Replayed localStorage");
        Ok(())
    }

    /// Clears `localStorage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script fails.
    pub async fn storage_clear(&self) -> Result<()> {
        debug!(tab_id = %self.tab_id(), "Clearing localStorage");
        self.evaluate("window.localStorage.clear();").await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
