use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every state change in a session produces an Event.
/// The presentation layer drains them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        user_id: String,
        coins: u64,
        at: DateTime<Utc>,
    },
    SessionActivated {
        at: DateTime<Utc>,
    },
    SessionDeactivated {
        idle_secs: u64,
        at: DateTime<Utc>,
    },
    /// One accrual interval elapsed while active.
    AccrualTick {
        minutes: u64,
        at: DateTime<Utc>,
    },
    /// Optimistic balance update, emitted before the ledger call is made.
    CoinsGranted {
        grant_id: u64,
        amount: u64,
        new_balance: u64,
        at: DateTime<Utc>,
    },
    /// The ledger's authoritative balance differed from the displayed one.
    BalanceCorrected {
        grant_id: u64,
        from: u64,
        to: u64,
        at: DateTime<Utc>,
    },
    /// The ledger call failed and the optimistic update was undone.
    GrantFailed {
        grant_id: u64,
        amount: u64,
        restored_balance: u64,
        error: String,
        at: DateTime<Utc>,
    },
    /// A response superseded by a later grant's confirmation was dropped.
    GrantIgnored {
        grant_id: u64,
        returned_balance: i64,
        at: DateTime<Utc>,
    },
    /// Balance pushed out-of-band by the realtime channel.
    BalanceSynced {
        from: u64,
        to: u64,
        at: DateTime<Utc>,
    },
    SessionEnded {
        user_id: String,
        coins: u64,
        minutes: u64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        user_id: String,
        coins: u64,
        active: bool,
        time_active_minutes: u64,
        elapsed_secs: u64,
        in_flight_grants: usize,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::SessionStarted { at, .. }
            | Event::SessionActivated { at }
            | Event::SessionDeactivated { at, .. }
            | Event::AccrualTick { at, .. }
            | Event::CoinsGranted { at, .. }
            | Event::BalanceCorrected { at, .. }
            | Event::GrantFailed { at, .. }
            | Event::GrantIgnored { at, .. }
            | Event::BalanceSynced { at, .. }
            | Event::SessionEnded { at, .. }
            | Event::StateSnapshot { at, .. } => *at,
        }
    }
}
