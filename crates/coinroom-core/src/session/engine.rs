//! Per-user accrual session.
//!
//! The session is a wall-clock state machine with no internal threads or
//! I/O. The caller feeds it interactions, drives its timers with
//! `advance(now)`, performs the [`GrantRequest`]s it hands back against the
//! ledger, and reports each result with `complete_grant`. Every state change
//! is queued as an [`Event`] for the presentation layer.
//!
//! ## Usage
//!
//! ```ignore
//! let mut session = Session::start(user, balance, settings, now)?;
//! session.record_activity(now);
//! for grant in session.advance(now) {
//!     let result = ledger.grant_coins(&grant.user_id, grant.amount).await;
//!     session.complete_grant(grant.id, result, now);
//! }
//! for event in session.drain_events() { /* render */ }
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::balance::{BalanceCache, GrantId, GrantOutcome};
use crate::activity::{ActivityMonitor, ActivitySignal};
use crate::error::{LedgerError, ValidationError};
use crate::events::Event;
use crate::identity::UserId;
use crate::storage::Config;
use crate::timer::{AccrualTimer, TimerHandle, TimerKind, TimerQueue};

/// Timing and reward parameters for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub inactivity_threshold: TimeDelta,
    pub sweep_interval: TimeDelta,
    pub accrual_interval: TimeDelta,
    pub grant_amount: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_threshold: TimeDelta::seconds(120),
            sweep_interval: TimeDelta::seconds(30),
            accrual_interval: TimeDelta::seconds(60),
            grant_amount: 1,
        }
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("inactivity_threshold", self.inactivity_threshold),
            ("sweep_interval", self.sweep_interval),
            ("accrual_interval", self.accrual_interval),
        ] {
            if value < TimeDelta::seconds(1) || value > TimeDelta::seconds(MAX_INTERVAL_SECS as i64) {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 1 and {MAX_INTERVAL_SECS} seconds"),
                });
            }
        }
        if self.grant_amount == 0 || self.grant_amount > i64::MAX as u64 {
            return Err(ValidationError::NonPositiveAmount(self.grant_amount as i64));
        }
        Ok(())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            inactivity_threshold: secs(config.activity.inactivity_threshold_secs),
            sweep_interval: secs(config.activity.sweep_interval_secs),
            accrual_interval: secs(config.accrual.interval_secs),
            grant_amount: config.accrual.amount,
        }
    }
}

/// Upper bound for any configured interval.
pub const MAX_INTERVAL_SECS: u64 = 86_400;

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(value.min(MAX_INTERVAL_SECS) as i64)
}

/// One unit of work for the ledger: add `amount` to `user_id`'s balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub id: GrantId,
    pub user_id: UserId,
    pub amount: i64,
}

#[derive(Debug)]
pub struct Session {
    user_id: UserId,
    settings: SessionSettings,
    started_at: DateTime<Utc>,
    monitor: ActivityMonitor,
    accrual: AccrualTimer,
    balance: BalanceCache,
    timers: TimerQueue,
    sweep: Option<TimerHandle>,
    events: VecDeque<Event>,
    ended: bool,
}

impl Session {
    /// Begin a session for an authenticated user. The session starts active:
    /// the inactivity sweep and the accrual timer are both armed at `now`.
    pub fn start(
        user_id: UserId,
        initial_balance: u64,
        settings: SessionSettings,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        settings.validate()?;
        let mut timers = TimerQueue::new();
        let sweep = timers.after(now, settings.sweep_interval, TimerKind::InactivitySweep);
        let mut accrual = AccrualTimer::new(settings.accrual_interval);
        accrual.start(now, &mut timers);

        info!(user = %user_id, coins = initial_balance, "accrual session started");
        let mut events = VecDeque::new();
        events.push_back(Event::SessionStarted {
            user_id: user_id.to_string(),
            coins: initial_balance,
            at: now,
        });
        events.push_back(Event::SessionActivated { at: now });

        Ok(Self {
            user_id,
            settings,
            started_at: now,
            monitor: ActivityMonitor::new(now, settings.inactivity_threshold),
            accrual,
            balance: BalanceCache::new(initial_balance),
            timers,
            sweep: Some(sweep),
            events,
            ended: false,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn coins(&self) -> u64 {
        self.balance.coins()
    }

    pub fn is_session_active(&self) -> bool {
        !self.ended && self.monitor.is_active()
    }

    pub fn time_active_minutes(&self) -> u64 {
        self.accrual.ticks()
    }

    /// Seconds since activity last (re)started; 0 while inactive.
    pub fn current_session_elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.accrual.elapsed_secs(now)
    }

    pub fn in_flight_grants(&self) -> usize {
        self.balance.in_flight()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Earliest armed timer; `None` once the session has ended.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        Event::StateSnapshot {
            user_id: self.user_id.to_string(),
            coins: self.coins(),
            active: self.is_session_active(),
            time_active_minutes: self.time_active_minutes(),
            elapsed_secs: self.current_session_elapsed_seconds(now),
            in_flight_grants: self.in_flight_grants(),
            at: now,
        }
    }

    /// Take every queued event in emission order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// An interaction was observed. Restarts accrual if the session was idle.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        if self.ended {
            return;
        }
        if self.monitor.record_activity(now) == Some(ActivitySignal::Activated) {
            self.accrual.start(now, &mut self.timers);
            debug!(user = %self.user_id, "session reactivated");
            self.events.push_back(Event::SessionActivated { at: now });
        }
    }

    /// Fire every timer due at or before `now`, in deadline order, and return
    /// the grants the caller must send to the ledger.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Vec<GrantRequest> {
        let mut grants = Vec::new();
        if self.ended {
            return grants;
        }
        while let Some(fired) = self.timers.pop_due(now) {
            match fired.kind {
                TimerKind::InactivitySweep => {
                    let next = fired.deadline + self.settings.sweep_interval;
                    self.sweep = Some(self.timers.at(next, TimerKind::InactivitySweep));
                    self.sweep_inactivity(fired.deadline);
                }
                TimerKind::AccrualTick if self.accrual.owns(&fired) => {
                    let minutes = self.accrual.on_tick(&fired, &mut self.timers);
                    debug!(user = %self.user_id, minutes, "accrual tick");
                    self.events.push_back(Event::AccrualTick {
                        minutes,
                        at: fired.deadline,
                    });
                    if let Some(grant) = self.begin_grant(fired.deadline) {
                        grants.push(grant);
                    }
                }
                TimerKind::AccrualTick => {}
            }
        }
        grants
    }

    /// Report the ledger's answer for a grant previously handed out by `advance`.
    /// Results arriving after the session ended are ignored.
    pub fn complete_grant(
        &mut self,
        id: GrantId,
        result: Result<i64, LedgerError>,
        now: DateTime<Utc>,
    ) {
        match result {
            Ok(authoritative) => match self.balance.confirm_grant(id, authoritative) {
                GrantOutcome::Corrected { from, to } => {
                    debug!(grant = id.value(), from, to, "balance corrected to ledger value");
                    self.events.push_back(Event::BalanceCorrected {
                        grant_id: id.value(),
                        from,
                        to,
                        at: now,
                    });
                }
                GrantOutcome::Stale { returned } => {
                    warn!(grant = id.value(), returned, "ignoring superseded ledger response");
                    self.events.push_back(Event::GrantIgnored {
                        grant_id: id.value(),
                        returned_balance: returned,
                        at: now,
                    });
                }
                GrantOutcome::Unknown => {
                    debug!(grant = id.value(), "result for unknown grant ignored");
                }
                GrantOutcome::Confirmed { .. } | GrantOutcome::RolledBack { .. } => {}
            },
            Err(err) => match self.balance.fail_grant(id) {
                GrantOutcome::RolledBack { amount, to, .. } => {
                    warn!(user = %self.user_id, grant = id.value(), error = %err, "coin grant failed, rolled back");
                    self.events.push_back(Event::GrantFailed {
                        grant_id: id.value(),
                        amount,
                        restored_balance: to,
                        error: err.to_string(),
                        at: now,
                    });
                }
                _ => {
                    debug!(grant = id.value(), error = %err, "failure for unknown grant ignored");
                }
            },
        }
    }

    /// Accept a balance pushed by the realtime channel as authoritative.
    pub fn apply_remote_balance(&mut self, balance: i64, now: DateTime<Utc>) {
        if self.ended {
            return;
        }
        if let Some((from, to)) = self.balance.apply_remote(balance) {
            debug!(user = %self.user_id, from, to, "balance synced from realtime push");
            self.events.push_back(Event::BalanceSynced { from, to, at: now });
        }
    }

    /// Tear down: cancel both timers, zero the active-minutes counter and
    /// forget in-flight grants. Idempotent.
    pub fn end(&mut self, now: DateTime<Utc>) {
        if self.ended {
            return;
        }
        let minutes = self.accrual.ticks();
        self.accrual.reset(&mut self.timers);
        if let Some(handle) = self.sweep.take() {
            self.timers.cancel(handle);
        }
        self.timers.clear();
        self.balance.abandon_in_flight();
        self.ended = true;

        info!(user = %self.user_id, coins = self.coins(), minutes, "accrual session ended");
        self.events.push_back(Event::SessionEnded {
            user_id: self.user_id.to_string(),
            coins: self.coins(),
            minutes,
            at: now,
        });
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn sweep_inactivity(&mut self, at: DateTime<Utc>) {
        if self.monitor.sweep_inactivity(at) == Some(ActivitySignal::Deactivated) {
            self.accrual.stop(&mut self.timers);
            let idle_secs = self.monitor.idle_for(at).num_seconds().max(0) as u64;
            debug!(user = %self.user_id, idle_secs, "session went idle");
            self.events.push_back(Event::SessionDeactivated { idle_secs, at });
        }
    }

    fn begin_grant(&mut self, at: DateTime<Utc>) -> Option<GrantRequest> {
        let amount = self.settings.grant_amount as i64;
        match self.balance.begin_grant(amount) {
            Ok((id, new_balance)) => {
                self.events.push_back(Event::CoinsGranted {
                    grant_id: id.value(),
                    amount: self.settings.grant_amount,
                    new_balance,
                    at,
                });
                Some(GrantRequest {
                    id,
                    user_id: self.user_id.clone(),
                    amount,
                })
            }
            Err(err) => {
                warn!(error = %err, "grant skipped");
                None
            }
        }
    }
}
