//! Async lifecycle tests. Tokio time is paused, so sleeping in a test moves
//! the runner's clock forward without waiting.

use std::sync::Arc;
use std::time::Duration;

use coinroom_core::{
    ActivityBus, ActivityKind, Event, Ledger, MemoryLedger, SessionHost, SessionSettings,
    TokioClock, UserId,
};
use tokio::sync::mpsc;
use tokio::time::sleep;

fn alice() -> UserId {
    UserId::new("alice").unwrap()
}

fn host(ledger: &Arc<MemoryLedger>) -> SessionHost<MemoryLedger, TokioClock> {
    SessionHost::new(Arc::clone(ledger), TokioClock::new(), SessionSettings::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn accrues_while_signed_in() {
    let ledger = Arc::new(MemoryLedger::new().with_balance(&alice(), 10));
    let bus = ActivityBus::new();
    let mut host = host(&ledger);

    let handle = host.sign_in(alice(), &bus).await.unwrap();
    assert_eq!(handle.view().coins, 10);
    assert!(handle.view().is_session_active);

    sleep(Duration::from_secs(61)).await;
    let view = host.current().unwrap().view();
    assert_eq!(view.coins, 11);
    assert_eq!(view.time_active_minutes, 1);
    assert_eq!(ledger.balance(&alice()), 11);

    let summary = host.sign_out().await.unwrap();
    assert_eq!(summary.coins, 11);
    assert_eq!(summary.time_active_minutes, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_grant_rolls_back_display() {
    let ledger = Arc::new(MemoryLedger::new().with_balance(&alice(), 10));
    ledger.fail_next(1);
    let bus = ActivityBus::new();
    let mut host = host(&ledger);
    host.sign_in(alice(), &bus).await.unwrap();

    sleep(Duration::from_secs(61)).await;
    let view = host.current().unwrap().view();
    assert_eq!(view.coins, 10);
    assert_eq!(view.time_active_minutes, 1);
    assert_eq!(ledger.balance(&alice()), 10);
    assert_eq!(ledger.grant_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_session_alive_and_idle_stops_accrual() {
    let ledger = Arc::new(MemoryLedger::new().with_balance(&alice(), 0));
    let bus = ActivityBus::new();
    let mut host = host(&ledger);
    host.sign_in(alice(), &bus).await.unwrap();

    // Input at 55, 105, ..., 305; offset so it never lands on a timer deadline.
    sleep(Duration::from_secs(5)).await;
    for _ in 0..6 {
        sleep(Duration::from_secs(50)).await;
        bus.emit(ActivityKind::Pointer);
    }
    let view = host.current().unwrap().view();
    assert!(view.is_session_active);
    assert_eq!(view.time_active_minutes, 5);

    // Go quiet: the sweep at 450 s sees 145 s idle; ticks at 360 and 420 fire first.
    sleep(Duration::from_secs(200)).await;
    let view = host.current().unwrap().view();
    assert!(!view.is_session_active);
    assert_eq!(view.current_session_elapsed_seconds, 0);
    assert_eq!(view.time_active_minutes, 7);

    sleep(Duration::from_secs(600)).await;
    assert_eq!(host.current().unwrap().view().time_active_minutes, 7);
    assert_eq!(ledger.balance(&alice()), 7);
}

#[tokio::test(start_paused = true)]
async fn sign_out_releases_listener_and_stops_timers() {
    let ledger = Arc::new(MemoryLedger::new().with_balance(&alice(), 3));
    let bus = ActivityBus::new();
    let mut host = host(&ledger);

    host.sign_in(alice(), &bus).await.unwrap();
    assert_eq!(bus.listener_count(), 1);

    host.sign_out().await.unwrap();
    assert_eq!(bus.listener_count(), 0);
    assert!(host.current().is_none());

    let calls = ledger.grant_calls();
    sleep(Duration::from_secs(600)).await;
    assert_eq!(ledger.grant_calls(), calls);
    assert!(host.sign_out().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn identity_switch_replaces_session() {
    let bob = UserId::new("bob").unwrap();
    let ledger = Arc::new(
        MemoryLedger::new()
            .with_balance(&alice(), 1)
            .with_balance(&bob, 50),
    );
    let bus = ActivityBus::new();
    let mut host = host(&ledger);

    assert!(host.set_identity(Some(alice()), &bus).await.unwrap().is_none());
    // Same identity again is a no-op.
    assert!(host.set_identity(Some(alice()), &bus).await.unwrap().is_none());
    assert_eq!(bus.listener_count(), 1);

    let ended = host.set_identity(Some(bob.clone()), &bus).await.unwrap().unwrap();
    assert_eq!(ended.user_id, alice());
    assert_eq!(bus.listener_count(), 1);
    let current = host.current().unwrap();
    assert_eq!(current.user_id(), &bob);
    assert_eq!(current.view().coins, 50);

    let ended = host.set_identity(None, &bus).await.unwrap().unwrap();
    assert_eq!(ended.user_id, bob);
    assert_eq!(bus.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_balance_starts_at_zero() {
    let ledger = Arc::new(MemoryLedger::new());
    let bus = ActivityBus::new();
    let mut host = host(&ledger);
    let handle = host.sign_in(alice(), &bus).await.unwrap();
    assert_eq!(handle.view().coins, 0);
}

#[tokio::test(start_paused = true)]
async fn realtime_push_is_authoritative() {
    let ledger = Arc::new(MemoryLedger::new().with_balance(&alice(), 10));
    let bus = ActivityBus::new();
    let mut host = host(&ledger);
    let handle = host.sign_in(alice(), &bus).await.unwrap();
    let mut watch = handle.watch();

    // A purchase elsewhere debited the ledger.
    assert!(handle.push_balance(4));
    let view = watch.wait_for(|view| view.coins == 4).await.unwrap().clone();
    assert_eq!(view.coins, 4);
    assert_eq!(ledger.balance(&alice()), 10);
}

#[tokio::test(start_paused = true)]
async fn grants_in_flight_at_sign_out_are_discarded() {
    let ledger = Arc::new(
        MemoryLedger::new()
            .with_balance(&alice(), 10)
            .with_latency(Duration::from_secs(30)),
    );
    let bus = ActivityBus::new();
    let mut host = host(&ledger);
    host.sign_in(alice(), &bus).await.unwrap();

    sleep(Duration::from_secs(70)).await;
    assert_eq!(host.current().unwrap().view().in_flight_grants, 1);

    let summary = host.sign_out().await.unwrap();
    assert_eq!(summary.coins, 11);

    // The detached call still reaches the ledger.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(ledger.balance(&alice()), 11);
    assert_eq!(ledger.fetch_balance(&alice()).await.unwrap(), 11);
}

#[tokio::test(start_paused = true)]
async fn dropping_host_ends_session() {
    let ledger = Arc::new(MemoryLedger::new().with_balance(&alice(), 0));
    let bus = ActivityBus::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut host = host(&ledger).with_events(tx);
    host.sign_in(alice(), &bus).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    drop(host);
    assert_eq!(bus.listener_count(), 0);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(Event::SessionStarted { .. })));
    assert!(matches!(events.last(), Some(Event::SessionEnded { .. })));
}
