//! Displayed coin balance with optimistic grants and reconciliation.
//!
//! Every grant gets a [`GrantId`] in issue order. The cache remembers, per
//! in-flight grant, the pre-grant snapshot and enough bookkeeping to decide
//! how to undo it:
//!
//! - nothing changed since its optimistic update: restore the snapshot;
//! - an authoritative value landed since it was issued: leave the display,
//!   that value never contained the failed delta;
//! - only other optimistic updates happened: subtract its own amount.
//!
//! A success response is stale, and dropped, once a grant issued after it has
//! been confirmed. Ledger totals can go down (debits share the same RPC), so
//! staleness is decided by issue order and never by comparing values. The
//! display therefore only shows optimistic values or values the ledger
//! returned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(u64);

impl GrantId {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingGrant {
    amount: u64,
    snapshot: u64,
    /// Cache revision right after this grant's optimistic update.
    revision_after: u64,
    /// Authoritative epoch when this grant was issued.
    epoch_at_issue: u64,
}

/// What completing a grant did to the displayed balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Authoritative value matched the display.
    Confirmed { balance: u64 },
    /// Authoritative value overwrote the display.
    Corrected { from: u64, to: u64 },
    /// A grant issued later was already confirmed.
    Stale { returned: i64 },
    /// The grant failed; the display now shows `to`.
    RolledBack { amount: u64, from: u64, to: u64 },
    /// No such grant in flight (already settled, or the session ended).
    Unknown,
}

#[derive(Debug, Default)]
pub struct BalanceCache {
    coins: u64,
    /// Bumped on every change to `coins` and every authoritative overwrite.
    revision: u64,
    /// Bumped on every authoritative overwrite (grant response or push).
    epoch: u64,
    next_grant: u64,
    /// Latest-issued grant whose success has been applied.
    newest_confirmed: Option<GrantId>,
    pending: HashMap<GrantId, PendingGrant>,
}

impl BalanceCache {
    pub fn new(coins: u64) -> Self {
        Self {
            coins,
            ..Self::default()
        }
    }

    pub fn coins(&self) -> u64 {
        self.coins
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Optimistically add `amount` and register the grant as in flight.
    /// Returns the grant id and the provisional balance.
    pub fn begin_grant(&mut self, amount: i64) -> Result<(GrantId, u64), ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        let amount = amount as u64;
        let snapshot = self.coins;
        self.set(snapshot.saturating_add(amount));

        let id = GrantId(self.next_grant);
        self.next_grant += 1;
        self.pending.insert(
            id,
            PendingGrant {
                amount,
                snapshot,
                revision_after: self.revision,
                epoch_at_issue: self.epoch,
            },
        );
        Ok((id, self.coins))
    }

    /// The ledger confirmed a grant and returned its authoritative total.
    pub fn confirm_grant(&mut self, id: GrantId, authoritative: i64) -> GrantOutcome {
        if self.pending.remove(&id).is_none() {
            return GrantOutcome::Unknown;
        }
        if self.newest_confirmed.is_some_and(|newest| newest > id) {
            return GrantOutcome::Stale {
                returned: authoritative,
            };
        }
        self.newest_confirmed = Some(id);

        let (from, to) = self.overwrite(authoritative);
        if from == to {
            return GrantOutcome::Confirmed { balance: to };
        }
        GrantOutcome::Corrected { from, to }
    }

    /// The ledger call failed: undo this grant's optimistic update.
    pub fn fail_grant(&mut self, id: GrantId) -> GrantOutcome {
        let Some(grant) = self.pending.remove(&id) else {
            return GrantOutcome::Unknown;
        };
        let from = self.coins;
        let to = if self.revision == grant.revision_after {
            grant.snapshot
        } else if self.epoch != grant.epoch_at_issue {
            from
        } else {
            from.saturating_sub(grant.amount)
        };
        if to != from {
            self.set(to);
        }
        GrantOutcome::RolledBack {
            amount: grant.amount,
            from,
            to,
        }
    }

    /// Authoritative balance pushed from outside the grant cycle.
    /// Returns `(from, to)` if the display changed.
    pub fn apply_remote(&mut self, authoritative: i64) -> Option<(u64, u64)> {
        let (from, to) = self.overwrite(authoritative);
        (from != to).then_some((from, to))
    }

    /// Forget every in-flight grant; their results will be reported as unknown.
    pub fn abandon_in_flight(&mut self) {
        self.pending.clear();
    }

    /// Apply an authoritative total. Counts as a revision even when the
    /// number is unchanged.
    fn overwrite(&mut self, authoritative: i64) -> (u64, u64) {
        let from = self.coins;
        let to = clamp_balance(authoritative);
        self.epoch += 1;
        self.set(to);
        (from, to)
    }

    fn set(&mut self, coins: u64) {
        self.coins = coins;
        self.revision += 1;
    }
}

fn clamp_balance(balance: i64) -> u64 {
    u64::try_from(balance).unwrap_or(0)
}
