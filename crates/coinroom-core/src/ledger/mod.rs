//! External system of record for coin balances.

pub mod credentials;
pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::identity::UserId;

pub use http::HttpLedger;
pub use memory::MemoryLedger;

/// Remote ledger operations used by a session.
///
/// `grant_coins` is an atomic increment: each call is an independent signed
/// delta (negative for purchase debits) and returns the resulting total.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn grant_coins(&self, user_id: &UserId, amount: i64) -> Result<i64, LedgerError>;

    /// Current authoritative balance, read when a session starts.
    async fn fetch_balance(&self, user_id: &UserId) -> Result<i64, LedgerError>;
}

#[async_trait]
impl<L: Ledger + ?Sized> Ledger for std::sync::Arc<L> {
    async fn grant_coins(&self, user_id: &UserId, amount: i64) -> Result<i64, LedgerError> {
        (**self).grant_coins(user_id, amount).await
    }

    async fn fetch_balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        (**self).fetch_balance(user_id).await
    }
}
