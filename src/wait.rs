//! Deadline races.
//!
//! Every "whichever happens first" in the crate is a [`race`] between a
//! polling future and a deadline. The loser is dropped, so a poll that is
//! mid-flight when the deadline passes never gets to act on its result.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout_at};

/// Runs `work` until it finishes or `deadline` passes.
///
/// Returns `None` if the deadline won.
pub async fn race<F>(deadline: Instant, work: F) -> Option<F::Output>
where
    F: Future,
{
    timeout_at(deadline, work).await.ok()
}

/// An interval whose first tick is one `period` from now.
///
/// Missed ticks are delayed rather than bursted, so a slow page round trip
/// never causes back-to-back polls.
#[must_use]
pub fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Instant `limit` from now.
#[inline]
#[must_use]
pub fn deadline_in(limit: Duration) -> Instant {
    Instant::now() + limit
}
