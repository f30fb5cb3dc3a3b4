//! Escalation timer
//!
//! One session slot guarded by a single lock. Arming fills the slot and
//! starts a 1 Hz ticker; check-in and expiry both compare-and-set the slot
//! from `(session, Armed)` to a terminal state, so exactly one of them wins.
//! Backend calls are spawned after the lock is released and are never
//! awaited by the countdown; [`EscalationTimer::flush`] drains them at exit.

use crate::alert::{AlertDispatcher, DispatchReport};
use crate::clock::{Clock, SystemClock};
use crate::context::SafetyContext;
use crate::error::EscalationError;
use crate::log::EscalationLog;
use crate::notify::{spawn_armed, spawn_checked_in, timer_minutes, NotificationSink};
use crate::state_machine::validate_transition;
use crate::types::{
    AlertReason, EscalationEvent, EscalationSession, EscalationState, EventKind, SessionId, UserId,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);

/// Progress of one session as seen by its handle
#[derive(Debug, Clone)]
pub enum SessionProgress {
    /// Counting down
    Armed {
        /// Seconds left as of the last tick
        remaining: u64,
    },
    /// User checked in
    CheckedIn,
    /// Countdown hit zero; alert dispatch in flight
    Expired,
    /// Alert dispatch finished
    Alerted(Arc<DispatchReport>),
    /// Session cancelled or replaced by a re-arm before reaching a terminal state
    Discarded,
}

impl SessionProgress {
    fn is_settled(&self) -> bool {
        !matches!(self, Self::Armed { .. })
    }
}

/// Caller's view of an armed session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    progress: watch::Receiver<SessionProgress>,
}

impl SessionHandle {
    /// Session identity (for `check_in`)
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session_id
    }

    /// Latest progress
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.progress.borrow().clone()
    }

    /// Seconds left, while armed
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        match *self.progress.borrow() {
            SessionProgress::Armed { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Wait for the next progress change
    ///
    /// Returns `None` once the timer has been dropped.
    pub async fn changed(&mut self) -> Option<SessionProgress> {
        self.progress.changed().await.ok()?;
        Some(self.progress.borrow_and_update().clone())
    }

    /// Wait until the session leaves `Armed`
    ///
    /// `None` when the session was discarded or the timer dropped.
    pub async fn wait_terminal(&mut self) -> Option<EscalationState> {
        let progress = self
            .progress
            .wait_for(SessionProgress::is_settled)
            .await
            .ok()?
            .clone();
        match progress {
            SessionProgress::CheckedIn => Some(EscalationState::CheckedIn),
            SessionProgress::Expired | SessionProgress::Alerted(_) => Some(EscalationState::Expired),
            SessionProgress::Armed { .. } | SessionProgress::Discarded => None,
        }
    }

    /// Wait for the expiry alert to finish dispatching
    ///
    /// `None` if the session ended any other way.
    pub async fn wait_alerted(&mut self) -> Option<Arc<DispatchReport>> {
        let progress = self
            .progress
            .wait_for(|p| p.is_settled() && !matches!(p, SessionProgress::Expired))
            .await
            .ok()?
            .clone();
        match progress {
            SessionProgress::Alerted(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct ActiveSession {
    session: EscalationSession,
    started: Instant,
    ticker: Option<JoinHandle<()>>,
    progress: Arc<watch::Sender<SessionProgress>>,
}

impl ActiveSession {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

enum Tick {
    Continue,
    Stale,
    Expired(UserId),
}

#[derive(Debug)]
struct TimerInner {
    context: SafetyContext,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    dispatcher: AlertDispatcher,
    log: Arc<EscalationLog>,
    slot: Mutex<Option<ActiveSession>>,
}

impl TimerInner {
    fn event(&self, session_id: SessionId, kind: EventKind) -> EscalationEvent {
        EscalationEvent {
            session_id,
            kind,
            occurred_at: self.clock.wall(),
        }
    }

    fn tick(&self, session_id: SessionId) -> Tick {
        let mut slot = self.slot.lock();
        let Some(active) = slot
            .as_mut()
            .filter(|a| a.session.session_id == session_id && a.session.state == EscalationState::Armed)
        else {
            return Tick::Stale;
        };

        let elapsed = self.clock.now().saturating_duration_since(active.started).as_secs();
        let remaining = active.session.duration_secs.saturating_sub(elapsed);
        if remaining >= active.session.last_tick_remaining && remaining != 0 {
            return Tick::Continue;
        }
        active.session.last_tick_remaining = remaining;

        if remaining > 0 {
            active.progress.send_replace(SessionProgress::Armed { remaining });
            return Tick::Continue;
        }

        if validate_transition(active.session.state, EscalationState::Expired).is_err() {
            return Tick::Stale;
        }
        active.session.state = EscalationState::Expired;
        // The ticker is the caller; it exits on its own.
        active.ticker = None;
        self.log.append(self.event(session_id, EventKind::Expired));
        active.progress.send_replace(SessionProgress::Expired);
        Tick::Expired(active.session.user.clone())
    }

    fn progress_sender(&self, session_id: SessionId) -> Option<Arc<watch::Sender<SessionProgress>>> {
        self.slot
            .lock()
            .as_ref()
            .filter(|a| a.session.session_id == session_id)
            .map(|a| Arc::clone(&a.progress))
    }
}

impl Drop for TimerInner {
    fn drop(&mut self) {
        if let Some(active) = self.slot.get_mut().as_mut() {
            active.stop_ticker();
        }
    }
}

async fn run_ticker(timer: Weak<TimerInner>, session_id: SessionId, started: Instant) {
    let mut interval = tokio::time::interval_at(started + TICK, TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let Some(inner) = timer.upgrade() else {
            return;
        };
        match inner.tick(session_id) {
            Tick::Continue => {}
            Tick::Stale => return,
            Tick::Expired(user) => {
                tracing::warn!(session = %session_id, %user, "safety timer expired, raising alert");
                let progress = inner.progress_sender(session_id);
                let report = inner
                    .dispatcher
                    .dispatch_for(user, AlertReason::TimerExpired)
                    .await;
                if let Some(progress) = progress {
                    progress.send_replace(SessionProgress::Alerted(Arc::new(report)));
                }
                return;
            }
        }
    }
}

/// Arm / countdown / check-in / expire state machine
#[derive(Debug, Clone)]
pub struct EscalationTimer {
    inner: Arc<TimerInner>,
}

impl EscalationTimer {
    /// Timer on the system clock with a fresh log
    #[must_use]
    pub fn new(
        context: SafetyContext,
        sink: Arc<dyn NotificationSink>,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self::with_parts(
            context,
            Arc::new(SystemClock),
            sink,
            dispatcher,
            Arc::new(EscalationLog::new()),
        )
    }

    /// Timer with explicit clock and log
    #[must_use]
    pub fn with_parts(
        context: SafetyContext,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        dispatcher: AlertDispatcher,
        log: Arc<EscalationLog>,
    ) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                context,
                clock,
                sink,
                dispatcher,
                log,
                slot: Mutex::new(None),
            }),
        }
    }

    /// Event log
    #[inline]
    #[must_use]
    pub fn log(&self) -> &Arc<EscalationLog> {
        &self.inner.log
    }

    /// Dispatcher used on expiry (also serves manual SOS)
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.inner.dispatcher
    }

    /// Wait up to `budget` for backend calls spawned by arm, check-in or
    /// alerts; returns how many are still running
    pub async fn flush(&self, budget: Duration) -> usize {
        self.inner.dispatcher.flush(budget).await
    }

    /// Current or most recent session
    #[must_use]
    pub fn session(&self) -> Option<EscalationSession> {
        self.inner.slot.lock().as_ref().map(|a| a.session.clone())
    }

    /// Current state (`Idle` when nothing was armed or the session was cancelled)
    #[must_use]
    pub fn state(&self) -> EscalationState {
        self.inner
            .slot
            .lock()
            .as_ref()
            .map_or(EscalationState::Idle, |a| a.session.state)
    }

    /// Start a fresh session of `duration_secs`, cancelling any armed one
    ///
    /// # Errors
    /// `InvalidDuration` for zero, `AuthRequired` when the identity policy
    /// demands a user and none is signed in
    pub fn arm(&self, duration_secs: u64) -> Result<SessionHandle, EscalationError> {
        if duration_secs == 0 {
            return Err(EscalationError::InvalidDuration);
        }
        let user = self
            .inner
            .context
            .effective_user()
            .ok_or(EscalationError::AuthRequired)?;
        validate_transition(EscalationState::Idle, EscalationState::Armed)?;

        let session_id = SessionId::new();
        let started = self.inner.clock.now();
        let (tx, rx) = watch::channel(SessionProgress::Armed {
            remaining: duration_secs,
        });
        let session = EscalationSession {
            session_id,
            user: user.clone(),
            armed_at: self.inner.clock.wall(),
            duration_secs,
            state: EscalationState::Armed,
            last_tick_remaining: duration_secs,
        };

        {
            let mut slot = self.inner.slot.lock();
            if let Some(mut previous) = slot.take() {
                if previous.session.state == EscalationState::Armed {
                    previous.stop_ticker();
                    previous.progress.send_replace(SessionProgress::Discarded);
                    tracing::info!(previous = %previous.session.session_id, "re-armed, previous session discarded");
                }
            }

            self.inner.log.append(self.inner.event(session_id, EventKind::Armed));
            let ticker = tokio::spawn(run_ticker(Arc::downgrade(&self.inner), session_id, started));
            *slot = Some(ActiveSession {
                session,
                started,
                ticker: Some(ticker),
                progress: Arc::new(tx),
            });
        }

        tracing::info!(session = %session_id, %user, duration_secs, "safety timer armed");
        spawn_armed(
            self.inner.dispatcher.tasks(),
            &self.inner.sink,
            user,
            timer_minutes(duration_secs),
        );

        Ok(SessionHandle {
            session_id,
            progress: rx,
        })
    }

    /// Confirm safety for `session_id`
    ///
    /// # Errors
    /// `NoActiveSession` unless that session is currently armed; nothing is
    /// logged or sent in that case
    pub fn check_in(&self, session_id: SessionId) -> Result<(), EscalationError> {
        let user = {
            let mut slot = self.inner.slot.lock();
            let active = slot
                .as_mut()
                .filter(|a| a.session.session_id == session_id && a.session.state == EscalationState::Armed)
                .ok_or(EscalationError::NoActiveSession)?;

            validate_transition(active.session.state, EscalationState::CheckedIn)?;
            active.session.state = EscalationState::CheckedIn;
            active.stop_ticker();
            self.inner.log.append(self.inner.event(session_id, EventKind::CheckedIn));
            active.progress.send_replace(SessionProgress::CheckedIn);
            active.session.user.clone()
        };

        tracing::info!(session = %session_id, %user, "checked in safely");
        spawn_checked_in(self.inner.dispatcher.tasks(), &self.inner.sink, user);
        Ok(())
    }

    /// Check in whatever session is armed
    ///
    /// # Errors
    /// `NoActiveSession` when nothing is armed
    pub fn check_in_current(&self) -> Result<SessionId, EscalationError> {
        let session_id = self
            .inner
            .slot
            .lock()
            .as_ref()
            .filter(|a| a.session.state == EscalationState::Armed)
            .map(|a| a.session.session_id)
            .ok_or(EscalationError::NoActiveSession)?;
        self.check_in(session_id)?;
        Ok(session_id)
    }

    /// Discard an armed session locally; no events, no backend call
    ///
    /// Idempotent. Terminal sessions are left as they are.
    pub fn cancel(&self) {
        let mut slot = self.inner.slot.lock();
        let armed = slot
            .as_ref()
            .is_some_and(|a| a.session.state == EscalationState::Armed);
        if armed {
            if let Some(mut active) = slot.take() {
                active.stop_ticker();
                active.progress.send_replace(SessionProgress::Discarded);
                tracing::info!(session = %active.session.session_id, "safety timer cancelled");
            }
        }
    }
}
