//! The page the host application runs in.
//!
//! [`Page`] is a cheap, cloneable handle over the extension connection
//! bound to one tab. Its methods are split by concern:
//!
//! | Module | Methods |
//! |--------|---------|
//! | `navigation` | `goto`, `reload` |
//! | `script` | `evaluate`, `call_function` |
//! | `dom` | `attribute` |
//! | `storage` | `storage_*` |
//! | `diagnostics` | `screenshot`, `browser_logs` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::{FrameId, TabId};
use crate::protocol::{Command, Request, Response};
use crate::transport::Connection;

use super::{AttributeProbe, PageHandle, StorageEntry};

// ============================================================================
// Submodules
// ============================================================================

mod diagnostics;
mod dom;
mod navigation;
mod script;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub(crate) use script::js_literal;

// ============================================================================
// Page
// ============================================================================

/// Shared state behind a [`Page`].
struct PageInner {
    /// Extension connection.
    connection: Connection,
    /// Tab the page lives in.
    tab_id: TabId,
    /// Frame commands target.
    frame_id: FrameId,
}

/// Handle to the browser tab.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("tab_id", &self.inner.tab_id)
            .field("frame_id", &self.inner.frame_id)
            .finish_non_exhaustive()
    }
}

impl Page {
    pub(crate) fn new(connection: Connection, tab_id: TabId) -> Self {
        Self {
            inner: Arc::new(PageInner {
                connection,
                tab_id,
                frame_id: FrameId::main(),
            }),
        }
    }

    /// Returns the tab ID.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.inner.tab_id
    }

    /// Returns the underlying connection.
    #[inline]
    pub(crate) fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Sends a command to this page's tab and frame.
    pub(crate) async fn send_command(&self, command: Command) -> Result<Response> {
        let request = Request::new(self.inner.tab_id, self.inner.frame_id, command);
        self.inner.connection.send(request).await
    }
}

// ============================================================================
// PageHandle
// ============================================================================

#[async_trait]
impl PageHandle for Page {
    async fn goto(&self, url: &str) -> Result<()> {
        Page::goto(self, url).await
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        Page::reload(self, timeout).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        Page::evaluate(self, script).await
    }

    async fn call_function(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        Page::call_function(self, path, args).await
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<AttributeProbe> {
        Page::attribute(self, selector, name).await
    }

    async fn storage_get(&self, key: &str) -> Result<Option<String>> {
        Page::storage_get(self, key).await
    }

    async fn storage_entries(&self) -> Result<Vec<StorageEntry>> {
        Page::storage_entries(self).await
    }

    async fn storage_replay(&self, entries: &[StorageEntry]) -> Result<()> {
        Page::storage_replay(self, entries).await
    }

    async fn storage_clear(&self) -> Result<()> {
        Page::storage_clear(self).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Page::screenshot(self).await
    }

    async fn browser_logs(&self) -> Result<Vec<Value>> {
        Page::browser_logs(self).await
    }
}
