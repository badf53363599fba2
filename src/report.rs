//! Error reporting policy.
//!
//! Every failure the controller handles is reported with an [`ErrorKind`].
//! The kind alone decides what happens next through [`ErrorKind::policy`]:
//!
//! | Kind | Severity | Clears session | Page related | Exit |
//! |------|----------|----------------|--------------|------|
//! | `SessionExpired` | critical | yes | yes | 0 |
//! | `RecoveryExhausted` | critical | no | yes | 0 |
//! | `PairingTimeout` | critical | no | yes | 0 |
//! | `PairingError` | critical | no | yes | 1 |
//! | `HostNotReady` | critical | no | yes | 1 |
//! | `LaunchFailed` | critical | no | no | 1 |
//! | `BrowserDisconnected` | critical | no | no | 1 |
//! | `LocalIo` | critical | no | no | 1 |
//! | `CheckFailed` | warning | no | yes | - |
//! | `MessageParse` | warning | no | no | - |
//! | `MediaFailed` | warning | no | no | - |
//! | `ChatLogWrite` | warning | no | no | - |
//! | `SessionSaveFailed` | warning | no | no | - |
//! | `SessionRestoreFailed` | warning | no | no | - |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use tracing::{error, info, warn};

use crate::browser::PageHandle;
use crate::config::{Settings, ensure_dir};
use crate::error::Result;
use crate::session::SessionStore;

// ============================================================================
// Policy Types
// ============================================================================

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Skip the failed operation and carry on.
    Warning,
    /// Stop the process.
    Critical,
}

/// What reporting an [`ErrorKind`] entails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Warning or critical.
    pub severity: Severity,
    /// Delete the persisted session before exiting.
    pub clear_session: bool,
    /// A screenshot of the page may explain the failure.
    pub page_related: bool,
    /// Process exit code for critical kinds.
    pub exit_code: i32,
}

impl Policy {
    const fn critical(clear_session: bool, page_related: bool, exit_code: i32) -> Self {
        Self {
            severity: Severity::Critical,
            clear_session,
            page_related,
            exit_code,
        }
    }

    const fn warning(page_related: bool) -> Self {
        Self {
            severity: Severity::Warning,
            clear_session: false,
            page_related,
            exit_code: 0,
        }
    }
}

/// Every failure the controller reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Logged out: credentials expired or the session was closed on the phone.
    SessionExpired,
    /// Logged in but still not receiving after the maximum reloads.
    RecoveryExhausted,
    /// Nobody scanned the pairing code.
    PairingTimeout,
    /// Pairing failed or the code element was in an unknown state.
    PairingError,
    /// The host application did not load in time.
    HostNotReady,
    /// The browser could not be started.
    LaunchFailed,
    /// The browser connection went away.
    BrowserDisconnected,
    /// A required local directory or file could not be created.
    LocalIo,
    /// A liveness check could not be completed.
    CheckFailed,
    /// One captured message could not be parsed.
    MessageParse,
    /// One attachment could not be downloaded or decrypted.
    MediaFailed,
    /// One chat log line could not be written.
    ChatLogWrite,
    /// The session could not be saved after pairing.
    SessionSaveFailed,
    /// The saved session could not be restored.
    SessionRestoreFailed,
}

impl ErrorKind {
    /// Looks up the policy for this kind.
    #[must_use]
    pub const fn policy(self) -> Policy {
        match self {
            Self::SessionExpired => Policy::critical(true, true, 0),
            Self::RecoveryExhausted | Self::PairingTimeout => Policy::critical(false, true, 0),
            Self::PairingError | Self::HostNotReady => Policy::critical(false, true, 1),
            Self::LaunchFailed | Self::BrowserDisconnected | Self::LocalIo => {
                Policy::critical(false, false, 1)
            }
            Self::CheckFailed => Policy::warning(true),
            Self::MessageParse
            | Self::MediaFailed
            | Self::ChatLogWrite
            | Self::SessionSaveFailed
            | Self::SessionRestoreFailed => Policy::warning(false),
        }
    }

    /// Message logged for critical kinds before exiting.
    fn explanation(self) -> Option<&'static str> {
        match self {
            Self::SessionExpired => Some(
                "The host application will not load. Your credentials may have expired or the \
                 session was closed from the phone; deleting the session data to recover",
            ),
            Self::RecoveryExhausted => Some(
                "The session still cannot receive messages after reloading; it may be open \
                 somewhere else",
            ),
            Self::PairingTimeout => Some("No user has scanned the QR code"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// What the caller does after reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Skip the failed operation.
    Continue,
    /// Stop with this exit code.
    Terminate {
        /// Process exit code.
        exit_code: i32,
    },
}

/// The single place errors are reported.
#[derive(Debug, Clone)]
pub struct Reporter {
    store: SessionStore,
    diagnostics_dir: PathBuf,
    screenshot_on_check: bool,
    dump_browser_logs: bool,
}

impl Reporter {
    /// Creates a reporter from settings.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            store: SessionStore::new(&settings.paths.session_file),
            diagnostics_dir: settings.diagnostics_dir(),
            screenshot_on_check: settings.screenshot_on_check,
            dump_browser_logs: settings.dump_browser_logs,
        }
    }

    /// Logs `context` under `kind` and applies the kind's policy.
    ///
    /// `page` is only touched for page-related kinds with diagnostics
    /// enabled; pass `None` when the page is gone.
    pub async fn report(
        &self,
        kind: ErrorKind,
        context: &str,
        page: Option<&dyn PageHandle>,
    ) -> Disposition {
        let policy = kind.policy();

        match policy.severity {
            Severity::Warning => warn!(%kind, "{context}"),
            Severity::Critical => {
                error!(%kind, "{context}");
                if let Some(explanation) = kind.explanation() {
                    error!(%kind, "{explanation}");
                }
            }
        }

        if policy.page_related
            && let Some(page) = page
        {
            self.collect_diagnostics(kind, page).await;
        }

        if policy.severity == Severity::Warning {
            return Disposition::Continue;
        }

        if policy.clear_session
            && let Err(e) = self.store.clear()
        {
            error!(error = %e, path = %self.store.path().display(), "Failed to delete session data");
        }

        info!(exit_code = policy.exit_code, "Exiting");
        Disposition::Terminate {
            exit_code: policy.exit_code,
        }
    }

    async fn collect_diagnostics(&self, kind: ErrorKind, page: &dyn PageHandle) {
        if !self.screenshot_on_check && !self.dump_browser_logs {
            return;
        }
        let stamp = format!("{}-{kind}", Local::now().format("%Y%m%d-%H%M%S"));

        if self.screenshot_on_check {
            match self.save_screenshot(&stamp, page).await {
                Ok(path) => info!(path = %path.display(), "Screenshot saved"),
                Err(e) => warn!(error = %e, "Could not capture screenshot"),
            }
        }
        if self.dump_browser_logs {
            match self.save_browser_logs(&stamp, page).await {
                Ok(path) => info!(path = %path.display(), "Browser logs saved"),
                Err(e) => warn!(error = %e, "Could not dump browser logs"),
            }
        }
    }

    async fn save_screenshot(&self, stamp: &str, page: &dyn PageHandle) -> Result<PathBuf> {
        let png = page.screenshot().await?;
        ensure_dir(&self.diagnostics_dir)?;
        let path = self.diagnostics_dir.join(format!("{stamp}.png"));
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }

    async fn save_browser_logs(&self, stamp: &str, page: &dyn PageHandle) -> Result<PathBuf> {
        let logs = page.browser_logs().await?;
        ensure_dir(&self.diagnostics_dir)?;
        let path = self.diagnostics_dir.join(format!("{stamp}.log.json"));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&logs)?).await?;
        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================
