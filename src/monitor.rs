//! Session liveness monitoring.
//!
//! The host can silently stop delivering messages to this client, e.g.
//! when the account is opened elsewhere. [`SessionMonitor`] checks on every
//! tick and reloads the page a bounded number of times before giving up.
//!
//! Per tick, in order:
//!
//! 1. Not logged in: [`TickReport::Expired`].
//! 2. Attempts at the ceiling: [`TickReport::Exhausted`].
//! 3. Refresh scheduled last tick: count an attempt, reload, skip the check.
//! 4. Otherwise run the receive check; failure schedules a refresh, success
//!    resets the counter.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, info, warn};

use crate::controller::SessionContext;
use crate::error::Result;

// ============================================================================
// RecoveryPolicy
// ============================================================================

/// What a tick has to do before the receive check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Session is gone.
    Expired,
    /// Recovery ceiling reached.
    Exhausted,
    /// Reload the page this tick.
    Reload,
    /// Run the receive check.
    CheckReceive,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// Messages are arriving; counter reset.
    Healthy,
    /// Receive check failed; reload next tick.
    RefreshScheduled,
    /// Page reloaded and hook re-armed.
    Reloaded,
    /// Not logged in any more.
    Expired,
    /// Logged in but reloads did not help.
    Exhausted,
}

impl TickReport {
    /// Returns `true` if the process should stop.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Exhausted)
    }
}

/// Recovery counter and refresh flag, free of any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    ceiling: u32,
    attempts: u32,
    refresh_scheduled: bool,
}

impl RecoveryPolicy {
    /// Creates a policy allowing `ceiling` consecutive reloads.
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            attempts: 0,
            refresh_scheduled: false,
        }
    }

    /// Consecutive reload attempts so far.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the next tick reloads.
    #[inline]
    #[must_use]
    pub fn refresh_scheduled(&self) -> bool {
        self.refresh_scheduled
    }

    /// Decides steps 1 to 3 of a tick.
    pub fn decide(&mut self, logged_in: bool) -> TickAction {
        if !logged_in {
            return TickAction::Expired;
        }
        if self.attempts >= self.ceiling {
            return TickAction::Exhausted;
        }
        if self.refresh_scheduled {
            self.attempts += 1;
            self.refresh_scheduled = false;
            return TickAction::Reload;
        }
        TickAction::CheckReceive
    }

    /// Records the receive check result.
    pub fn observe(&mut self, receivable: bool) -> TickReport {
        if receivable {
            self.attempts = 0;
            TickReport::Healthy
        } else {
            self.refresh_scheduled = true;
            TickReport::RefreshScheduled
        }
    }
}

// ============================================================================
// SessionMonitor
// ============================================================================

/// Applies a [`RecoveryPolicy`] to a live session.
#[derive(Debug, Clone)]
pub struct SessionMonitor {
    policy: RecoveryPolicy,
}

impl SessionMonitor {
    /// Creates a monitor allowing `ceiling` consecutive reloads.
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            policy: RecoveryPolicy::new(ceiling),
        }
    }

    /// Returns the policy state.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Runs one check.
    ///
    /// A reload re-runs readiness detection and re-attaches the hook before
    /// returning, so the next tick sees a live page.
    ///
    /// # Errors
    ///
    /// Returns page errors and [`crate::Error::HostNotReady`] if the host does
    /// not come back after a reload.
    pub async fn tick(&mut self, ctx: &mut SessionContext) -> Result<TickReport> {
        let logged_in = ctx.is_logged_in().await?;
        debug!(logged_in, attempts = self.policy.attempts, "Checking session");

        match self.policy.decide(logged_in) {
            TickAction::Expired => Ok(TickReport::Expired),
            TickAction::Exhausted => Ok(TickReport::Exhausted),
            TickAction::Reload => {
                info!(attempt = self.policy.attempts, "Reloading page to recover message delivery");
                ctx.reload().await?;
                Ok(TickReport::Reloaded)
            }
            TickAction::CheckReceive => {
                let receivable = ctx.can_receive().await?;
                let report = self.policy.observe(receivable);
                if report == TickReport::RefreshScheduled {
                    warn!("Session cannot receive messages, refresh scheduled");
                }
                Ok(report)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::browser::StorageEntry;
    use crate::browser::fake::FakePage;
    use crate::config::Timings;
    use crate::host::EventHook;
    use crate::host::constants::RECEIVE_MARKER_CONSTANT;

    #[test]
    fn test_unhealthy_then_refresh_then_healthy() {
        let mut policy = RecoveryPolicy::new(3);

        assert_eq!(policy.decide(true), TickAction::CheckReceive);
        assert_eq!(policy.observe(false), TickReport::RefreshScheduled);
        assert_eq!(policy.attempts(), 0);
        assert!(policy.refresh_scheduled());

        assert_eq!(policy.decide(true), TickAction::Reload);
        assert_eq!(policy.attempts(), 1);
        assert!(!policy.refresh_scheduled());

        assert_eq!(policy.decide(true), TickAction::CheckReceive);
        assert_eq!(policy.observe(true), TickReport::Healthy);
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn test_logged_out_wins_over_everything() {
        let mut policy = RecoveryPolicy::new(0);
        assert_eq!(policy.decide(false), TickAction::Expired);
        assert_eq!(policy.decide(true), TickAction::Exhausted);
    }

    proptest! {
        #[test]
        fn prop_ceiling_is_terminal(ceiling in 0u32..5, extra_ticks in 0usize..20) {
            let mut policy = RecoveryPolicy::new(ceiling);
            for _ in 0..ceiling {
                prop_assert_eq!(policy.decide(true), TickAction::CheckReceive);
                policy.observe(false);
                prop_assert_eq!(policy.decide(true), TickAction::Reload);
            }
            for _ in 0..extra_ticks {
                prop_assert_eq!(policy.decide(true), TickAction::Exhausted);
            }
            prop_assert_eq!(policy.attempts(), ceiling);
        }
    }

    fn context(page: &Arc<FakePage>) -> SessionContext {
        let mut timings = Timings::default();
        timings.ready_poll = std::time::Duration::from_millis(1);
        SessionContext::new(page.clone(), EventHook::default(), timings)
    }

    fn unhealthy_page() -> FakePage {
        FakePage::new()
            .logged_in()
            .with_listener_ready_after(0)
            .with_storage("last-wid", "\"5511@c.us\"")
            .with_constants(json!({"GIVE_UP_WAIT": 20_000}))
            .with_receive_marker(RECEIVE_MARKER_CONSTANT, "pushname-")
    }

    #[tokio::test]
    async fn test_reload_heals_and_marker_is_memoized() {
        let page = Arc::new(
            unhealthy_page().with_on_reload(vec![StorageEntry::new("pushname-5511@c.us", "Ana")]),
        );
        let mut ctx = context(&page);
        ctx.hook().install(page.as_ref()).await.expect("install");
        ctx.load_constants().await.expect("constants");
        let mut monitor = SessionMonitor::new(3);

        assert_eq!(monitor.tick(&mut ctx).await.expect("tick"), TickReport::RefreshScheduled);
        assert_eq!(monitor.tick(&mut ctx).await.expect("tick"), TickReport::Reloaded);
        assert_eq!(page.reloads(), 1);
        assert_eq!(page.listener_entries(), 1);

        assert_eq!(monitor.tick(&mut ctx).await.expect("tick"), TickReport::Healthy);
        assert_eq!(monitor.policy().attempts(), 0);
        assert_eq!(page.marker_calls(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_after_ceiling() {
        let page = Arc::new(unhealthy_page());
        let mut ctx = context(&page);
        ctx.hook().install(page.as_ref()).await.expect("install");
        ctx.load_constants().await.expect("constants");
        let mut monitor = SessionMonitor::new(2);

        let mut reports = Vec::new();
        for _ in 0..6 {
            reports.push(monitor.tick(&mut ctx).await.expect("tick"));
        }
        assert_eq!(
            reports,
            [
                TickReport::RefreshScheduled,
                TickReport::Reloaded,
                TickReport::RefreshScheduled,
                TickReport::Reloaded,
                TickReport::Exhausted,
                TickReport::Exhausted,
            ]
        );
        assert_eq!(page.reloads(), 2);
    }

    #[tokio::test]
    async fn test_logged_out_session_expires() {
        let page = Arc::new(unhealthy_page());
        page.remove_storage("logout-token");
        let mut ctx = context(&page);
        let mut monitor = SessionMonitor::new(3);

        let report = monitor.tick(&mut ctx).await.expect("tick");
        assert_eq!(report, TickReport::Expired);
        assert!(report.is_terminal());
    }
}
