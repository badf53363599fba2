//! Browser process and page handle.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Browser`] | Owns the Firefox process, profile and connection |
//! | [`Page`] | The single tab the host application runs in |
//! | [`PageHandle`] | Everything the state machines need from a page |
//!
//! The state machines are written against [`PageHandle`] rather than
//! [`Page`], so tests drive them with an in-memory page.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Browser process ownership.
pub mod instance;

/// Page handle over the extension connection.
pub mod page;

#[cfg(test)]
pub(crate) mod fake;

// ============================================================================
// Re-exports
// ============================================================================

pub use instance::Browser;
pub use page::Page;

// ============================================================================
// Types
// ============================================================================

/// One `localStorage` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Storage key.
    pub key: String,
    /// Stored string value.
    pub value: String,
}

impl StorageEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of reading an attribute from the first element matching a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeProbe {
    /// No element matches.
    Absent,
    /// The element exists; `None` if the attribute is missing or empty.
    Present(Option<String>),
}

// ============================================================================
// PageHandle
// ============================================================================

/// Operations on the page the host application runs in.
///
/// Every call is a round trip to the browser and a suspension point.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigates to `url`.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Reloads and waits for the new document's DOMContentLoaded.
    async fn reload(&self, timeout: Duration) -> Result<()>;

    /// Evaluates a script body; `return` yields the value.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Calls the page function at `path` (e.g. `window.foo.bar`) with `args`.
    async fn call_function(&self, path: &str, args: Vec<Value>) -> Result<Value>;

    /// Reads attribute `name` of the first element matching `selector`.
    async fn attribute(&self, selector: &str, name: &str) -> Result<AttributeProbe>;

    /// Reads one `localStorage` value.
    async fn storage_get(&self, key: &str) -> Result<Option<String>>;

    /// Reads every `localStorage` entry.
    async fn storage_entries(&self) -> Result<Vec<StorageEntry>>;

    /// Writes every entry into `localStorage`, in order.
    async fn storage_replay(&self, entries: &[StorageEntry]) -> Result<()>;

    /// Clears `localStorage`.
    async fn storage_clear(&self) -> Result<()>;

    /// Captures the visible page as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Takes and clears the extension's buffered log entries.
    async fn browser_logs(&self) -> Result<Vec<Value>>;
}
