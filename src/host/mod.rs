//! Module discovery and message hooking inside the host application.
//!
//! The host keeps its modules in a bundler cache. A small in-page runtime
//! ([`HOOK_SOURCE`], exposed as `window.__wl`) walks that cache using a
//! [`ModuleMatcher`], attaches a message callback to the new-message
//! listener array and buffers what it captures. [`EventHook`] drives it from
//! Rust.
//!
//! | Runtime function | Used for |
//! |------------------|----------|
//! | `configure(matcher)` | Install the structural matcher |
//! | `inject({trial})` | Readiness probe (`trial`) or attach |
//! | `constants()` | One-shot constants probe |
//! | `receiveMarker(identity, name)` | Storage key for the receive check |
//! | `drain()` | Take buffered messages |
//!
//! A reload discards the runtime together with the document, so
//! [`EventHook::arm`] is re-run after every reload.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::browser::PageHandle;
use crate::error::{Error, Result};
use crate::wait::{deadline_in, race, ticker};

// ============================================================================
// Submodules
// ============================================================================

/// Host constants.
pub mod constants;

/// Structural module matchers.
pub mod matcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use constants::{HostConstants, LoginMarkers};
pub use matcher::ModuleMatcher;

// ============================================================================
// Runtime
// ============================================================================

/// Source of the in-page runtime.
pub const HOOK_SOURCE: &str = include_str!("hook.js");

pub(crate) const FN_CONFIGURE: &str = "window.__wl.configure";
pub(crate) const FN_INJECT: &str = "window.__wl.inject";
pub(crate) const FN_CONSTANTS: &str = "window.__wl.constants";
pub(crate) const FN_RECEIVE_MARKER: &str = "window.__wl.receiveMarker";
pub(crate) const FN_DRAIN: &str = "window.__wl.drain";

// ============================================================================
// InjectStatus
// ============================================================================

/// Result of `window.__wl.inject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectStatus {
    /// No module exposes a listener array yet.
    NotFound,
    /// Trial mode found the listener array.
    Ready,
    /// The callback was appended.
    Attached,
    /// The callback was already in the array.
    AlreadyAttached,
}

impl InjectStatus {
    /// Returns `true` if the listener array exists.
    #[inline]
    #[must_use]
    pub fn is_found(self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

// ============================================================================
// EventHook
// ============================================================================

/// Drives the in-page runtime.
#[derive(Debug, Clone, Default)]
pub struct EventHook {
    matcher: ModuleMatcher,
}

impl EventHook {
    /// Creates a hook using `matcher` to find the listener and constants.
    #[must_use]
    pub fn new(matcher: ModuleMatcher) -> Self {
        Self { matcher }
    }

    /// Returns the matcher.
    #[inline]
    #[must_use]
    pub fn matcher(&self) -> &ModuleMatcher {
        &self.matcher
    }

    /// Evaluates the runtime into the current document and configures it.
    ///
    /// Safe to call repeatedly; an existing runtime is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the script fails.
    pub async fn install(&self, page: &dyn PageHandle) -> Result<()> {
        page.evaluate(HOOK_SOURCE).await?;
        page.call_function(FN_CONFIGURE, vec![serde_json::to_value(&self.matcher)?])
            .await?;
        debug!("Hook runtime installed");
        Ok(())
    }

    /// Probes for the listener array without attaching.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is missing or the probe throws.
    pub async fn probe(&self, page: &dyn PageHandle) -> Result<bool> {
        Ok(self.inject(page, true).await?.is_found())
    }

    /// Attaches the message callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if no module exposes the listener.
    pub async fn attach(&self, page: &dyn PageHandle) -> Result<InjectStatus> {
        let status = self.inject(page, false).await?;
        match status {
            InjectStatus::NotFound => Err(Error::protocol("message listener not found")),
            InjectStatus::AlreadyAttached => {
                debug!("Message callback already attached");
                Ok(status)
            }
            _ => {
                info!("Message callback attached");
                Ok(status)
            }
        }
    }

    /// Polls [`EventHook::probe`] every `poll` until it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostNotReady`] if `limit` elapses first.
    pub async fn wait_ready(&self, page: &dyn PageHandle, poll: Duration, limit: Duration) -> Result<()> {
        let outcome = race(deadline_in(limit), async {
            let mut tick = ticker(poll);
            loop {
                tick.tick().await;
                if self.probe(page).await? {
                    return Ok::<(), Error>(());
                }
            }
        })
        .await;

        match outcome {
            Some(result) => {
                debug!("Host application ready");
                result
            }
            None => Err(Error::host_not_ready(limit.as_millis() as u64)),
        }
    }

    /// Installs the runtime, waits for the host and attaches.
    ///
    /// Run after the initial navigation and after every reload.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`EventHook::install`],
    /// [`EventHook::wait_ready`] and [`EventHook::attach`].
    pub async fn arm(&self, page: &dyn PageHandle, poll: Duration, limit: Duration) -> Result<()> {
        self.install(page).await?;
        self.wait_ready(page, poll, limit).await?;
        self.attach(page).await?;
        Ok(())
    }

    /// Reads the host constants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostConstants`] if the module is missing or
    /// incomplete.
    pub async fn constants(&self, page: &dyn PageHandle) -> Result<HostConstants> {
        let value = page.call_function(FN_CONSTANTS, Vec::new()).await?;
        HostConstants::from_value(&value)
    }

    /// Resolves the receive-marker storage key for `identity`.
    ///
    /// Returns `None` if the host does not define `constant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime throws.
    pub async fn receive_marker(
        &self,
        page: &dyn PageHandle,
        identity: &str,
        constant: &str,
    ) -> Result<Option<String>> {
        let value = page
            .call_function(FN_RECEIVE_MARKER, vec![json!(identity), json!(constant)])
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Takes every message captured since the last drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is gone or returns a non-array.
    pub async fn drain(&self, page: &dyn PageHandle) -> Result<Vec<Value>> {
        match page.call_function(FN_DRAIN, Vec::new()).await? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::protocol(format!("drain returned {other}"))),
        }
    }

    async fn inject(&self, page: &dyn PageHandle, trial: bool) -> Result<InjectStatus> {
        let value = page
            .call_function(FN_INJECT, vec![json!({ "trial": trial })])
            .await?;
        serde_json::from_value(value).map_err(Error::Json)
    }
}

// ============================================================================
// Tests
// ============================================================================
