//! Property tests for idle detection and balance convergence.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use coinroom_core::session::{GrantRequest, Session, SessionSettings};
use coinroom_core::{LedgerError, MemoryLedger, Scenario, UserId};
use proptest::prelude::*;

fn t(secs: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::seconds(secs as i64)
}

fn settings(threshold: u64, sweep: u64) -> SessionSettings {
    SessionSettings {
        inactivity_threshold: TimeDelta::seconds(threshold as i64),
        sweep_interval: TimeDelta::seconds(sweep as i64),
        ..SessionSettings::default()
    }
}

#[derive(Debug, Clone)]
enum Step {
    /// Interact, then let a minute pass.
    Tick,
    /// The oldest outstanding grant reaches the ledger, or fails.
    Settle { ok: bool },
    /// Another device moves the balance; `push` says whether the realtime
    /// channel reports it.
    External { delta: i64, push: bool },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Tick),
        3 => any::<bool>().prop_map(|ok| Step::Settle { ok }),
        2 => (-20i64..20, any::<bool>()).prop_map(|(delta, push)| Step::External { delta, push }),
    ]
}

struct Harness {
    user: UserId,
    ledger: MemoryLedger,
    session: Session,
    queued: VecDeque<GrantRequest>,
    now: u64,
}

impl Harness {
    fn new(balance: u64) -> Self {
        let user = UserId::new("prop").unwrap();
        let ledger = MemoryLedger::new().with_balance(&user, balance as i64);
        let session = Session::start(user.clone(), balance, SessionSettings::default(), t(0)).unwrap();
        Self { user, ledger, session, queued: VecDeque::new(), now: 0 }
    }

    fn tick(&mut self) {
        self.session.record_activity(t(self.now));
        self.now += 60;
        self.queued.extend(self.session.advance(t(self.now)));
    }

    /// Calls reach the ledger in the order they were issued.
    fn settle(&mut self, ok: bool) {
        if let Some(grant) = self.queued.pop_front() {
            let result = if ok {
                self.ledger.apply_grant(&grant.user_id, grant.amount)
            } else {
                Err(LedgerError::Unavailable)
            };
            self.session.complete_grant(grant.id, result, t(self.now));
        }
    }

    fn external(&mut self, delta: i64, push: bool) {
        if self.ledger.balance(&self.user) + delta < 0 {
            return;
        }
        let balance = self.ledger.apply_grant(&self.user, delta).unwrap();
        if push {
            self.session.apply_remote_balance(balance, t(self.now));
        }
    }
}

proptest! {
    #[test]
    fn short_gaps_never_deactivate(
        threshold in 5u64..300,
        sweep in 1u64..120,
        gaps in prop::collection::vec(0.0f64..1.0, 1..40),
    ) {
        let user = UserId::new("prop").unwrap();
        let mut s = Session::start(user, 0, settings(threshold, sweep), t(0)).unwrap();
        let mut at = 0u64;
        for fraction in gaps {
            // Strictly below the threshold.
            at += ((threshold - 1) as f64 * fraction) as u64;
            s.advance(t(at));
            prop_assert!(s.is_session_active(), "idle at {} with threshold {}", at, threshold);
            s.record_activity(t(at));
        }
    }

    #[test]
    fn long_gap_deactivates_within_one_sweep(
        threshold in 1u64..300,
        sweep in 1u64..120,
        last_input in 0u64..1_000,
    ) {
        let user = UserId::new("prop").unwrap();
        let mut s = Session::start(user, 0, settings(threshold, sweep), t(0)).unwrap();
        s.advance(t(last_input));
        s.record_activity(t(last_input));

        s.advance(t(last_input + threshold));
        prop_assert!(s.is_session_active());

        s.advance(t(last_input + threshold + sweep));
        prop_assert!(!s.is_session_active());
    }

    #[test]
    fn display_converges_to_ledger(
        initial in 0i64..1_000,
        active_for in 0u64..600,
        latency in 0u64..180,
        fail_ticks in prop::collection::vec(1u64..12, 0..8),
    ) {
        let mut scenario = Scenario::new(UserId::new("prop").unwrap(), initial, 0);
        scenario.activity_at = (0..=active_for).step_by(30).collect();
        // Long enough for the session to go idle and every grant to settle.
        scenario.duration_secs = active_for + 400 + latency;
        scenario.latency_secs = latency;
        scenario.fail_ticks = fail_ticks;

        let report = scenario.run(t(0)).unwrap();
        prop_assert_eq!(report.displayed_balance as i64, report.ledger_balance);
        prop_assert!(report.ledger_balance >= initial);
    }

    #[test]
    fn display_converges_after_outside_changes(
        initial in 0u64..200,
        steps in prop::collection::vec(step(), 0..60),
    ) {
        let mut h = Harness::new(initial);
        let mut unpushed = false;
        for step in steps {
            match step {
                Step::Tick => h.tick(),
                Step::Settle { ok } => h.settle(ok),
                Step::External { delta, push } => {
                    unpushed |= !push && delta != 0;
                    h.external(delta, push);
                }
            }
        }
        while !h.queued.is_empty() {
            h.settle(true);
        }
        if !unpushed {
            prop_assert_eq!(h.session.coins() as i64, h.ledger.balance(&h.user));
        }

        // One more successful grant carries any unpushed change.
        h.tick();
        prop_assert_eq!(h.queued.len(), 1);
        h.settle(true);
        prop_assert_eq!(h.session.coins() as i64, h.ledger.balance(&h.user));
        prop_assert_eq!(h.session.in_flight_grants(), 0);
    }
}
