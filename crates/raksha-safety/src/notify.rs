//! Fire-and-forget notification contract
//!
//! Implementations make at most one network attempt per call and swallow
//! every failure. Callers spawn these calls onto a [`NotificationTasks`]
//! set and never await them on the escalation path; the process awaits
//! [`NotificationTasks::flush`] once before it exits.

use crate::types::{Coordinates, UserId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Remote audit/timer service, best effort
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync + Debug {
    /// Timer armed for `minutes` whole minutes
    async fn notify_armed(&self, user: &UserId, minutes: u32);

    /// User checked in
    async fn notify_checked_in(&self, user: &UserId);

    /// Emergency raised, with the position if known
    async fn notify_sos(&self, user: &UserId, coordinates: Option<Coordinates>);
}

/// Sink that drops everything (offline builds, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn notify_armed(&self, _user: &UserId, _minutes: u32) {}

    async fn notify_checked_in(&self, _user: &UserId) {}

    async fn notify_sos(&self, _user: &UserId, _coordinates: Option<Coordinates>) {}
}

/// Whole minutes sent to the backend for a countdown of `seconds`
///
/// Rounds up so the remote timer never fires before the local one.
#[must_use]
pub fn timer_minutes(seconds: u64) -> u32 {
    u32::try_from(seconds.div_ceil(60).max(1)).unwrap_or(u32::MAX)
}

/// Background notification calls still in flight
///
/// A runtime drops unfinished tasks when it shuts down, so a short-lived
/// process must [`flush`](Self::flush) before returning from `main`.
#[derive(Debug, Default)]
pub struct NotificationTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl NotificationTasks {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<F>(&self, call: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(call);
    }

    /// Calls not yet reaped
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait up to `budget` for every call spawned so far
    ///
    /// Returns how many were still running at the deadline. Those are
    /// detached, not aborted.
    pub async fn flush(&self, budget: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let drained = tokio::time::timeout(budget, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_ok() {
            return 0;
        }
        let left = tasks.len();
        tracing::warn!(left, ?budget, "notifications still in flight");
        tasks.detach_all();
        left
    }
}

/// Spawn `notify_armed` without waiting on it
pub(crate) fn spawn_armed(
    tasks: &NotificationTasks,
    sink: &Arc<dyn NotificationSink>,
    user: UserId,
    minutes: u32,
) {
    let sink = Arc::clone(sink);
    tasks.spawn(async move { sink.notify_armed(&user, minutes).await });
}

/// Spawn `notify_checked_in` without waiting on it
pub(crate) fn spawn_checked_in(
    tasks: &NotificationTasks,
    sink: &Arc<dyn NotificationSink>,
    user: UserId,
) {
    let sink = Arc::clone(sink);
    tasks.spawn(async move { sink.notify_checked_in(&user).await });
}

/// Spawn `notify_sos` without waiting on it
pub(crate) fn spawn_sos(
    tasks: &NotificationTasks,
    sink: &Arc<dyn NotificationSink>,
    user: UserId,
    coordinates: Option<Coordinates>,
) {
    let sink = Arc::clone(sink);
    tasks.spawn(async move { sink.notify_sos(&user, coordinates).await });
}
