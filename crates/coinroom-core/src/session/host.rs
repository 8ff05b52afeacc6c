//! Identity-gated session lifecycle.
//!
//! Nothing runs until a user id is known. Signing in reads the starting
//! balance, registers an activity listener and spawns a runner; signing out
//! (or dropping the handle) releases the listener and stops both timers.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::engine::{Session, SessionSettings};
use super::runner::{RunnerInputs, SessionRunner, SessionSummary, SessionView};
use crate::activity::{ActivityListener, ActivitySource};
use crate::clock::Clock;
use crate::error::ValidationError;
use crate::events::Event;
use crate::identity::UserId;
use crate::ledger::Ledger;

/// A running session. Dropping it ends the session.
pub struct SessionHandle {
    user_id: UserId,
    listener: Option<ActivityListener>,
    realtime: mpsc::UnboundedSender<i64>,
    shutdown: Option<oneshot::Sender<()>>,
    view: watch::Receiver<SessionView>,
    task: Option<JoinHandle<SessionSummary>>,
}

impl SessionHandle {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// A receiver notified whenever the view changes.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Deliver an authoritative balance from the realtime channel.
    /// Returns false if the session has already stopped.
    pub fn push_balance(&self, balance: i64) -> bool {
        self.realtime.send(balance).is_ok()
    }

    /// End the session and wait for the runner's final summary.
    pub async fn end(mut self) -> Option<SessionSummary> {
        self.listener.take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let task = self.task.take()?;
        match task.await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(error = %err, "session runner did not shut down cleanly");
                None
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub struct SessionHost<L, C> {
    ledger: Arc<L>,
    clock: C,
    settings: SessionSettings,
    events: Option<mpsc::UnboundedSender<Event>>,
    current: Option<SessionHandle>,
}

impl<L, C> SessionHost<L, C>
where
    L: Ledger + 'static,
    C: Clock + Clone + 'static,
{
    pub fn new(ledger: Arc<L>, clock: C, settings: SessionSettings) -> Result<Self, ValidationError> {
        settings.validate()?;
        Ok(Self {
            ledger,
            clock,
            settings,
            events: None,
            current: None,
        })
    }

    /// Forward every event of every future session to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// Follow the identity provider: start, switch, or end the session.
    /// Returns the summary of a session that was ended by this call.
    pub async fn set_identity(
        &mut self,
        user_id: Option<UserId>,
        source: &dyn ActivitySource,
    ) -> Result<Option<SessionSummary>, ValidationError> {
        match user_id {
            Some(user_id) if self.current.as_ref().map(|c| c.user_id()) == Some(&user_id) => Ok(None),
            Some(user_id) => {
                let ended = self.sign_out().await;
                self.sign_in(user_id, source).await?;
                Ok(ended)
            }
            None => Ok(self.sign_out().await),
        }
    }

    /// Start a session for `user_id`, ending any current one first.
    pub async fn sign_in(
        &mut self,
        user_id: UserId,
        source: &dyn ActivitySource,
    ) -> Result<&SessionHandle, ValidationError> {
        if let Some(previous) = self.current.take() {
            previous.end().await;
        }

        let initial = match self.ledger.fetch_balance(&user_id).await {
            Ok(balance) => u64::try_from(balance).unwrap_or(0),
            Err(err) => {
                warn!(user = %user_id, error = %err, "could not read starting balance, assuming 0");
                0
            }
        };

        let now = self.clock.now();
        let session = Session::start(user_id.clone(), initial, self.settings, now)?;

        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let (realtime_tx, realtime_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (view_tx, view_rx) = watch::channel(SessionView::of(&session, now));

        let listener = source.on_activity(Box::new(move |kind| {
            let _ = activity_tx.send(kind);
        }));

        let mut runner =
            SessionRunner::new(session, Arc::clone(&self.ledger), self.clock.clone(), view_tx);
        if let Some(events) = &self.events {
            runner = runner.with_events(events.clone());
        }
        let task = tokio::spawn(runner.run(RunnerInputs {
            activity: activity_rx,
            realtime: realtime_rx,
            shutdown: shutdown_rx,
        }));

        info!(user = %user_id, coins = initial, "signed in");
        Ok(self.current.insert(SessionHandle {
            user_id,
            listener: Some(listener),
            realtime: realtime_tx,
            shutdown: Some(shutdown_tx),
            view: view_rx,
            task: Some(task),
        }))
    }

    /// End the current session, if any.
    pub async fn sign_out(&mut self) -> Option<SessionSummary> {
        let handle = self.current.take()?;
        info!(user = %handle.user_id(), "signed out");
        handle.end().await
    }
}
