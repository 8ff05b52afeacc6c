//! Accrual timer: one reward-eligibility tick per interval while active.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running   (activity signal)
//! Running -> Stopped   (inactivity signal or session end)
//! ```
//!
//! The active-minutes counter advances on the tick itself, never on grant
//! confirmation, so the displayed timer stays monotonic through outages.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::queue::{FiredTimer, TimerHandle, TimerKind, TimerQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccrualState {
    Stopped,
    Running,
}

#[derive(Debug)]
pub struct AccrualTimer {
    interval: TimeDelta,
    /// Instant the timer last transitioned to Running.
    running_since: Option<DateTime<Utc>>,
    handle: Option<TimerHandle>,
    ticks: u64,
}

impl AccrualTimer {
    pub fn new(interval: TimeDelta) -> Self {
        Self {
            interval,
            running_since: None,
            handle: None,
            ticks: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> AccrualState {
        if self.running_since.is_some() {
            AccrualState::Running
        } else {
            AccrualState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Ticks fired since the session began (one per active minute).
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    /// Whole seconds since the timer last (re)started; 0 while stopped.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        self.running_since
            .map(|since| (now - since).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Whether a fired timer belongs to this accrual timer.
    pub fn owns(&self, fired: &FiredTimer) -> bool {
        fired.kind == TimerKind::AccrualTick && self.handle == Some(fired.handle)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start ticking; the first tick lands one full interval after `now`.
    /// Returns false if already running.
    pub fn start(&mut self, now: DateTime<Utc>, timers: &mut TimerQueue) -> bool {
        if self.is_running() {
            return false;
        }
        self.running_since = Some(now);
        self.handle = Some(timers.after(now, self.interval, TimerKind::AccrualTick));
        true
    }

    /// Stop ticking and cancel the pending tick. Returns false if already stopped.
    pub fn stop(&mut self, timers: &mut TimerQueue) -> bool {
        if !self.is_running() {
            return false;
        }
        if let Some(handle) = self.handle.take() {
            timers.cancel(handle);
        }
        self.running_since = None;
        true
    }

    /// Record a fired tick and re-arm from its deadline so late processing
    /// never drifts the cadence. Returns the new tick count.
    pub fn on_tick(&mut self, fired: &FiredTimer, timers: &mut TimerQueue) -> u64 {
        self.ticks += 1;
        self.handle = Some(timers.at(fired.deadline + self.interval, TimerKind::AccrualTick));
        self.ticks
    }

    /// Stop and zero the counter (session end).
    pub fn reset(&mut self, timers: &mut TimerQueue) {
        self.stop(timers);
        self.ticks = 0;
    }
}
