//! Deterministic replay of a session against an in-memory ledger.
//!
//! Time is virtual: the replay jumps from one interesting instant to the
//! next (grant response, scripted interaction, timer deadline) instead of
//! sleeping. Useful for demonstrating accrual behaviour and for tests.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, ValidationError};
use crate::events::Event;
use crate::identity::UserId;
use crate::ledger::MemoryLedger;
use crate::session::{GrantRequest, Session, SessionSettings, MAX_INTERVAL_SECS};

/// Longest scripted session, in seconds (one leap year).
pub const MAX_SCENARIO_SECS: u64 = 366 * 86_400;

/// Script for one simulated session. All offsets are seconds after start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub user_id: UserId,
    /// Ledger balance when the session starts.
    pub initial_balance: i64,
    pub duration_secs: u64,
    /// Offsets of scripted interactions.
    #[serde(default)]
    pub activity_at: Vec<u64>,
    /// 1-based tick numbers whose grant call fails.
    #[serde(default)]
    pub fail_ticks: Vec<u64>,
    /// Round-trip time of every grant call.
    #[serde(default)]
    pub latency_secs: u64,
    #[serde(skip)]
    pub settings: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub events: Vec<Event>,
    /// Balance displayed when the session ended.
    pub displayed_balance: u64,
    pub ledger_balance: i64,
    /// Active minutes counted before the session ended.
    pub time_active_minutes: u64,
}

struct InFlight {
    due: DateTime<Utc>,
    tick: u64,
    grant: GrantRequest,
}

enum Step {
    Complete(usize),
    Activity,
    Timers(DateTime<Utc>),
}

impl Scenario {
    pub fn new(user_id: UserId, initial_balance: i64, duration_secs: u64) -> Self {
        Self {
            user_id,
            initial_balance,
            duration_secs,
            activity_at: Vec::new(),
            fail_ticks: Vec::new(),
            latency_secs: 0,
            settings: SessionSettings::default(),
        }
    }

    /// Replay the script starting at `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, if the duration or
    /// latency exceed [`MAX_SCENARIO_SECS`], or if the replay would run past
    /// the representable date range.
    pub fn run(&self, origin: DateTime<Utc>) -> Result<SimulationReport, ValidationError> {
        let end = offset(origin, "duration_secs", self.duration_secs)?;
        let latency = seconds("latency_secs", self.latency_secs)?;
        // Timers may be armed up to one interval past the end, and responses
        // land one latency later.
        offset(end, "duration_secs", 2 * MAX_INTERVAL_SECS + self.latency_secs)?;

        let mut activity: Vec<DateTime<Utc>> = self
            .activity_at
            .iter()
            .filter(|s| **s <= self.duration_secs)
            .map(|s| offset(origin, "activity_at", *s))
            .collect::<Result<_, _>>()?;
        activity.sort();
        let mut activity = activity.into_iter().peekable();

        let ledger = MemoryLedger::new().with_balance(&self.user_id, self.initial_balance);
        let mut session = Session::start(
            self.user_id.clone(),
            u64::try_from(self.initial_balance).unwrap_or(0),
            self.settings,
            origin,
        )?;
        let mut in_flight: Vec<InFlight> = Vec::new();
        let mut ticks = 0u64;
        let mut events = Vec::new();

        loop {
            // Equal instants resolve as: responses, then input, then timers.
            let next_completion = in_flight
                .iter()
                .enumerate()
                .min_by_key(|(_, f)| f.due)
                .map(|(i, f)| (f.due, i));
            let mut step: Option<(DateTime<Utc>, Step)> =
                next_completion.map(|(due, i)| (due, Step::Complete(i)));
            if let Some(&at) = activity.peek() {
                if step.as_ref().map_or(true, |(t, _)| at < *t) {
                    step = Some((at, Step::Activity));
                }
            }
            if let Some(at) = session.next_deadline() {
                if step.as_ref().map_or(true, |(t, _)| at < *t) {
                    step = Some((at, Step::Timers(at)));
                }
            }

            let Some((at, step)) = step.filter(|(at, _)| *at <= end) else {
                break;
            };

            match step {
                Step::Complete(index) => {
                    let done = in_flight.swap_remove(index);
                    let result = if self.fail_ticks.contains(&done.tick) {
                        Err(LedgerError::Unavailable)
                    } else {
                        ledger.apply_grant(&done.grant.user_id, done.grant.amount)
                    };
                    session.complete_grant(done.grant.id, result, at);
                }
                Step::Activity => {
                    activity.next();
                    session.record_activity(at);
                }
                Step::Timers(deadline) => {
                    for grant in session.advance(deadline) {
                        ticks += 1;
                        in_flight.push(InFlight {
                            due: deadline + latency,
                            tick: ticks,
                            grant,
                        });
                    }
                }
            }
            events.extend(session.drain_events());
        }

        let displayed_balance = session.coins();
        let time_active_minutes = session.time_active_minutes();
        session.end(end);
        events.extend(session.drain_events());

        Ok(SimulationReport {
            events,
            displayed_balance,
            ledger_balance: ledger.balance(&self.user_id),
            time_active_minutes,
        })
    }
}

fn seconds(field: &str, secs: u64) -> Result<TimeDelta, ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: field.to_string(),
        message: format!("must be at most {MAX_SCENARIO_SECS} seconds"),
    };
    if secs > MAX_SCENARIO_SECS {
        return Err(invalid());
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(invalid)
}

fn offset(from: DateTime<Utc>, field: &str, secs: u64) -> Result<DateTime<Utc>, ValidationError> {
    from.checked_add_signed(seconds(field, secs)?)
        .ok_or_else(|| ValidationError::InvalidValue {
            field: field.to_string(),
            message: "runs past the supported date range".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn steady_activity_accrues_one_coin_per_minute() {
        let mut scenario = Scenario::new(UserId::new("u").unwrap(), 10, 300);
        scenario.activity_at = (0..=300).step_by(60).collect();
        let report = scenario.run(origin()).unwrap();
        assert_eq!(report.time_active_minutes, 5);
        assert_eq!(report.displayed_balance, 15);
        assert_eq!(report.ledger_balance, 15);
        assert!(matches!(report.events.last(), Some(Event::SessionEnded { .. })));
    }

    #[test]
    fn failed_tick_still_counts_but_does_not_pay() {
        let mut scenario = Scenario::new(UserId::new("u").unwrap(), 10, 120);
        scenario.activity_at = vec![100];
        scenario.fail_ticks = vec![1];
        let report = scenario.run(origin()).unwrap();
        assert_eq!(report.time_active_minutes, 2);
        assert_eq!(report.displayed_balance, 11);
        assert_eq!(report.ledger_balance, 11);
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, Event::GrantFailed { restored_balance: 10, .. })));
    }

    #[test]
    fn oversized_offsets_are_rejected() {
        let user = UserId::new("u").unwrap();
        let long = Scenario::new(user.clone(), 0, 10_000_000_000_000);
        assert!(matches!(long.run(origin()), Err(ValidationError::InvalidValue { .. })));

        let wrapping = Scenario::new(user.clone(), 0, u64::MAX);
        assert!(wrapping.run(origin()).is_err());

        let mut slow = Scenario::new(user.clone(), 0, 60);
        slow.latency_secs = u64::MAX;
        assert!(slow.run(origin()).is_err());

        let near_the_end = DateTime::<Utc>::MAX_UTC - TimeDelta::seconds(10);
        assert!(Scenario::new(user, 0, 60).run(near_the_end).is_err());
    }

    #[test]
    fn activity_past_the_end_is_ignored() {
        let mut scenario = Scenario::new(UserId::new("u").unwrap(), 0, 60);
        scenario.activity_at = vec![30, u64::MAX];
        assert!(scenario.run(origin()).is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut scenario = Scenario::new(UserId::new("u").unwrap(), 0, 60);
        scenario.settings.accrual_interval = TimeDelta::zero();
        assert!(matches!(scenario.run(origin()), Err(ValidationError::InvalidValue { .. })));
    }
}
