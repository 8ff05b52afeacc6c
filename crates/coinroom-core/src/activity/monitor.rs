//! Active/inactive classification from recent input.

use chrono::{DateTime, TimeDelta, Utc};

/// Transition reported to the accrual timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    Activated,
    Deactivated,
}

#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    last_activity_at: DateTime<Utc>,
    active: bool,
    threshold: TimeDelta,
}

impl ActivityMonitor {
    /// A monitor for a session that begins active at `now`.
    pub fn new(now: DateTime<Utc>, threshold: TimeDelta) -> Self {
        Self {
            last_activity_at: now,
            active: true,
            threshold,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn threshold(&self) -> TimeDelta {
        self.threshold
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> TimeDelta {
        (now - self.last_activity_at).max(TimeDelta::zero())
    }

    /// Note an interaction. Returns `Activated` if the session was inactive.
    pub fn record_activity(&mut self, now: DateTime<Utc>) -> Option<ActivitySignal> {
        // Out-of-order timestamps never move the marker backwards.
        self.last_activity_at = self.last_activity_at.max(now);
        if self.active {
            return None;
        }
        self.active = true;
        Some(ActivitySignal::Activated)
    }

    /// Periodic check. Returns `Deactivated` once idle time exceeds the threshold.
    pub fn sweep_inactivity(&mut self, now: DateTime<Utc>) -> Option<ActivitySignal> {
        if !self.active || self.idle_for(now) <= self.threshold {
            return None;
        }
        self.active = false;
        Some(ActivitySignal::Deactivated)
    }
}
