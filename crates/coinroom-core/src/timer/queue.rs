//! Virtual one-shot timer queue.
//!
//! Stands in for platform interval primitives: callers arm a timer with
//! `after(now, delay, kind)`, cancel it through its handle, and drain the
//! timers that are due with `pop_due(now)`. Periodic behaviour is built by
//! re-arming from the fired deadline. Nothing here sleeps.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// What a timer fires for. The two periodic timers are never coalesced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    InactivitySweep,
    AccrualTick,
}

/// Cancelation handle for an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// A timer removed from the queue because its deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub handle: TimerHandle,
    pub kind: TimerKind,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    /// Ordered by deadline, then by arming order for equal deadlines.
    entries: BTreeMap<(DateTime<Utc>, u64), TimerKind>,
    deadlines: HashMap<u64, DateTime<Utc>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer `delay` after `now`.
    pub fn after(&mut self, now: DateTime<Utc>, delay: TimeDelta, kind: TimerKind) -> TimerHandle {
        self.at(now + delay, kind)
    }

    /// Arm a one-shot timer at an absolute deadline.
    pub fn at(&mut self, deadline: DateTime<Utc>, kind: TimerKind) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert((deadline, id), kind);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    /// Cancel an armed timer. Returns false if it already fired or was canceled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.entries.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<FiredTimer> {
        let (&(deadline, id), _) = self.entries.iter().next()?;
        if deadline > now {
            return None;
        }
        let kind = self.entries.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some(FiredTimer {
            handle: TimerHandle(id),
            kind,
            deadline,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every armed timer.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.deadlines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.after(t(0), TimeDelta::seconds(60), TimerKind::AccrualTick);
        queue.after(t(0), TimeDelta::seconds(30), TimerKind::InactivitySweep);

        assert!(queue.pop_due(t(29)).is_none());
        let first = queue.pop_due(t(100)).unwrap();
        assert_eq!(first.kind, TimerKind::InactivitySweep);
        assert_eq!(first.deadline, t(30));
        let second = queue.pop_due(t(100)).unwrap();
        assert_eq!(second.kind, TimerKind::AccrualTick);
        assert!(queue.pop_due(t(100)).is_none());
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let mut queue = TimerQueue::new();
        queue.at(t(60), TimerKind::AccrualTick);
        queue.at(t(60), TimerKind::InactivitySweep);
        assert_eq!(queue.pop_due(t(60)).unwrap().kind, TimerKind::AccrualTick);
        assert_eq!(queue.pop_due(t(60)).unwrap().kind, TimerKind::InactivitySweep);
    }

    #[test]
    fn cancel_removes_timer_once() {
        let mut queue = TimerQueue::new();
        let handle = queue.after(t(0), TimeDelta::seconds(60), TimerKind::AccrualTick);
        assert!(queue.is_armed(handle));
        assert!(queue.cancel(handle));
        assert!(!queue.cancel(handle));
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn fired_timers_cannot_be_canceled() {
        let mut queue = TimerQueue::new();
        let handle = queue.after(t(0), TimeDelta::seconds(1), TimerKind::InactivitySweep);
        assert!(queue.pop_due(t(1)).is_some());
        assert!(!queue.cancel(handle));
    }
}
