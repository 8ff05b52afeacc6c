//! In-memory ledger with injectable outages.
//!
//! Used by tests and by the CLI's offline `simulate`/`run --memory` modes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::Ledger;
use crate::error::LedgerError;
use crate::identity::UserId;

#[derive(Debug, Default)]
struct State {
    balances: HashMap<UserId, i64>,
    /// Number of upcoming grant calls that fail.
    fail_next: usize,
    offline: bool,
    calls: usize,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    latency: Duration,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user's balance.
    pub fn with_balance(self, user_id: &UserId, balance: i64) -> Self {
        self.lock().balances.insert(user_id.clone(), balance);
        self
    }

    /// Delay every async call by `latency` (tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` grant calls fail.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Take the whole ledger down or bring it back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn balance(&self, user_id: &UserId) -> i64 {
        self.lock().balances.get(user_id).copied().unwrap_or(0)
    }

    /// Grant calls received so far, failed ones included.
    pub fn grant_calls(&self) -> usize {
        self.lock().calls
    }

    /// Synchronous atomic increment, shared by the async impl and simulations.
    pub fn apply_grant(&self, user_id: &UserId, amount: i64) -> Result<i64, LedgerError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.offline {
            return Err(LedgerError::Unavailable);
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LedgerError::Unavailable);
        }
        let balance = state.balances.entry(user_id.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn grant_coins(&self, user_id: &UserId, amount: i64) -> Result<i64, LedgerError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.apply_grant(user_id, amount)
    }

    async fn fetch_balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let state = self.lock();
        if state.offline {
            return Err(LedgerError::Unavailable);
        }
        state
            .balances
            .get(user_id)
            .copied()
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("u1").unwrap()
    }

    #[test]
    fn grants_are_additive_and_signed() {
        let ledger = MemoryLedger::new().with_balance(&user(), 10);
        assert_eq!(ledger.apply_grant(&user(), 1).unwrap(), 11);
        assert_eq!(ledger.apply_grant(&user(), -4).unwrap(), 7);
        assert_eq!(ledger.balance(&user()), 7);
    }

    #[test]
    fn injected_failures_do_not_apply() {
        let ledger = MemoryLedger::new().with_balance(&user(), 10);
        ledger.fail_next(1);
        assert!(matches!(ledger.apply_grant(&user(), 1), Err(LedgerError::Unavailable)));
        assert_eq!(ledger.apply_grant(&user(), 1).unwrap(), 11);
        assert_eq!(ledger.grant_calls(), 2);
    }

    #[tokio::test]
    async fn fetch_unknown_user_errors() {
        let ledger = MemoryLedger::new();
        let err = ledger.fetch_balance(&user()).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn offline_ledger_rejects_everything() {
        let ledger = MemoryLedger::new().with_balance(&user(), 3);
        ledger.set_offline(true);
        assert!(ledger.grant_coins(&user(), 1).await.is_err());
        assert!(ledger.fetch_balance(&user()).await.is_err());
        ledger.set_offline(false);
        assert_eq!(ledger.grant_coins(&user(), 1).await.unwrap(), 4);
    }
}
