//! Time sources
//!
//! Countdown ticks run on the monotonic `tokio` clock (pausable in tests);
//! event timestamps come from the wall clock.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tokio::time::Instant;

/// Clock used by the escalation timer
pub trait Clock: Send + Sync + Debug {
    /// Monotonic instant driving ticks
    fn now(&self) -> Instant;

    /// Wall-clock time stamped onto events
    fn wall(&self) -> DateTime<Utc>;
}

/// Real time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock anchored at construction and advanced by the monotonic clock
///
/// Keeps timestamps consistent with a paused `tokio` clock.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
}

impl AnchoredClock {
    /// Anchor at `wall_origin`
    #[must_use]
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed();
        chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.wall_origin.checked_add_signed(d))
            .unwrap_or(self.wall_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn anchored_clock_follows_paused_time() {
        let start = Utc::now();
        let clock = AnchoredClock::new(start);
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!((clock.wall() - start).num_seconds(), 90);
    }
}
