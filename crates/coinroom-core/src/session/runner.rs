//! Async driver for a [`Session`].
//!
//! One task owns the session and is its only writer. It sleeps until the
//! next timer deadline, applies activity and realtime pushes as they arrive,
//! and runs ledger calls concurrently on a `JoinSet`; calls are never
//! serialized against each other. On shutdown the session is ended and any
//! call still in flight is detached, its result discarded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::warn;

use super::balance::GrantId;
use super::engine::{GrantRequest, Session};
use crate::activity::ActivityKind;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::events::Event;
use crate::identity::UserId;
use crate::ledger::Ledger;

/// Read-only values for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub coins: u64,
    pub is_session_active: bool,
    pub time_active_minutes: u64,
    pub current_session_elapsed_seconds: u64,
    pub in_flight_grants: usize,
}

impl SessionView {
    pub fn of(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            coins: session.coins(),
            is_session_active: session.is_session_active(),
            time_active_minutes: session.time_active_minutes(),
            current_session_elapsed_seconds: session.current_session_elapsed_seconds(now),
            in_flight_grants: session.in_flight_grants(),
        }
    }
}

/// Final figures reported when a runner shuts down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub user_id: UserId,
    pub coins: u64,
    pub time_active_minutes: u64,
}

pub struct RunnerInputs {
    pub activity: mpsc::UnboundedReceiver<ActivityKind>,
    pub realtime: mpsc::UnboundedReceiver<i64>,
    /// Resolves (sent or dropped) when the session must end.
    pub shutdown: oneshot::Receiver<()>,
}

type GrantResult = (GrantId, Result<i64, LedgerError>);

pub struct SessionRunner<L, C> {
    session: Session,
    ledger: Arc<L>,
    clock: C,
    view: watch::Sender<SessionView>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl<L, C> SessionRunner<L, C>
where
    L: Ledger + 'static,
    C: Clock,
{
    pub fn new(session: Session, ledger: Arc<L>, clock: C, view: watch::Sender<SessionView>) -> Self {
        Self {
            session,
            ledger,
            clock,
            view,
            events: None,
        }
    }

    /// Forward every session event to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(mut self, mut inputs: RunnerInputs) -> SessionSummary {
        let mut in_flight: JoinSet<GrantResult> = JoinSet::new();
        self.publish();

        loop {
            let wake = self
                .session
                .next_deadline()
                .map(|at| self.clock.instant_for(at));

            tokio::select! {
                biased;
                _ = &mut inputs.shutdown => break,
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => match done {
                    Ok((id, result)) => self.session.complete_grant(id, result, self.clock.now()),
                    Err(err) => warn!(error = %err, "grant task did not complete"),
                },
                // Deadlines come before input so a steady stream of
                // interactions cannot hold back ticks or sweeps.
                _ = sleep_until(wake) => {
                    for grant in self.session.advance(self.clock.now()) {
                        self.dispatch(&mut in_flight, grant);
                    }
                }
                Some(_kind) = inputs.activity.recv() => {
                    self.session.record_activity(self.clock.now());
                }
                Some(balance) = inputs.realtime.recv() => {
                    self.session.apply_remote_balance(balance, self.clock.now());
                }
            }

            self.publish();
        }

        self.session.end(self.clock.now());
        self.publish();
        in_flight.detach_all();

        SessionSummary {
            user_id: self.session.user_id().clone(),
            coins: self.session.coins(),
            time_active_minutes: self.session.time_active_minutes(),
        }
    }

    fn dispatch(&self, in_flight: &mut JoinSet<GrantResult>, grant: GrantRequest) {
        let ledger = Arc::clone(&self.ledger);
        in_flight.spawn(async move {
            let result = ledger.grant_coins(&grant.user_id, grant.amount).await;
            (grant.id, result)
        });
    }

    fn publish(&mut self) {
        let now = self.clock.now();
        for event in self.session.drain_events() {
            if let Some(events) = &self.events {
                // Listeners may have gone away; the session does not care.
                let _ = events.send(event);
            }
        }
        self.view.send_replace(SessionView::of(&self.session, now));
    }
}

async fn sleep_until(wake: Option<Instant>) {
    match wake {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::TokioClock;
    use crate::ledger::MemoryLedger;
    use crate::session::SessionSettings;

    #[tokio::test(start_paused = true)]
    async fn due_tick_is_not_held_back_by_queued_input() {
        let user = UserId::new("busy").unwrap();
        let clock = TokioClock::new();
        let ledger = Arc::new(MemoryLedger::new().with_balance(&user, 10));
        let session = Session::start(user, 10, SessionSettings::default(), clock.now()).unwrap();
        let (view_tx, mut view) = watch::channel(SessionView::of(&session, clock.now()));
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (activity_tx, activity) = mpsc::unbounded_channel();
        let (realtime_tx, realtime) = mpsc::unbounded_channel();
        let (stop, shutdown) = oneshot::channel();
        let runner = SessionRunner::new(session, ledger, clock, view_tx).with_events(events_tx);
        let task = tokio::spawn(runner.run(RunnerInputs {
            activity,
            realtime,
            shutdown,
        }));

        tokio::time::sleep(Duration::from_secs(59)).await;
        // The push sits behind a long backlog of input; the tick at 60 s
        // must not wait for the backlog to drain.
        for _ in 0..100_000 {
            activity_tx.send(ActivityKind::Pointer).unwrap();
        }
        realtime_tx.send(500).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        view.wait_for(|v| v.time_active_minutes >= 1 && v.coins >= 500)
            .await
            .unwrap();
        drop(stop);
        task.await.unwrap();

        let mut granted = None;
        let mut synced = None;
        let mut index = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                Event::CoinsGranted { .. } if granted.is_none() => granted = Some(index),
                Event::BalanceSynced { to: 500, .. } if synced.is_none() => synced = Some(index),
                _ => {}
            }
            index += 1;
        }
        let (granted, synced) = (granted.unwrap(), synced.unwrap());
        assert!(granted < synced, "tick at {granted} came after the push at {synced}");
    }
}
