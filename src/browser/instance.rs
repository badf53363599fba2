//! Browser process ownership.
//!
//! A [`Browser`] owns one Firefox process, its temporary profile and the
//! extension connection. Dropping it kills the process.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::Profile;
use crate::identifiers::{SessionId, TabId};
use crate::transport::Connection;

use super::Page;

// ============================================================================
// ProcessGuard
// ============================================================================

/// Kills the child process when dropped.
struct ProcessGuard {
    /// The child process handle.
    child: Option<Child>,
    /// Process ID for logging.
    pid: u32,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Kills the process and reaps it.
    async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(pid = self.pid, error = %e, "Failed to kill process");
            }
            info!(pid = self.pid, "Firefox process terminated");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Browser
// ============================================================================

/// A running Firefox instance with its single page.
pub struct Browser {
    /// Session ID assigned before launch.
    session_id: SessionId,
    /// The page the host application runs in.
    page: Page,
    /// Firefox process.
    process: Mutex<ProcessGuard>,
    /// Kept alive until the browser is gone.
    _profile: Profile,
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("session_id", &self.session_id)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

impl Browser {
    pub(crate) fn new(
        connection: Connection,
        child: Child,
        profile: Profile,
        session_id: SessionId,
        tab_id: TabId,
    ) -> Self {
        debug!(%session_id, %tab_id, pid = child.id(), "Browser created");
        Self {
            session_id,
            page: Page::new(connection, tab_id),
            process: Mutex::new(ProcessGuard::new(child)),
            _profile: profile,
        }
    }

    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the page handle.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Closes the connection and kills Firefox.
    pub async fn close(&self) {
        debug!(session_id = %self.session_id, "Closing browser");
        self.page.connection().shutdown();
        self.process.lock().await.kill().await;
    }

    /// Like [`Browser::close`] but gives up after `limit`.
    ///
    /// Returns `false` if the deadline passed first; the process is still
    /// killed when the browser is dropped.
    pub async fn close_within(&self, limit: Duration) -> bool {
        match timeout(limit, self.close()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Browser did not close in time");
                false
            }
        }
    }
}
