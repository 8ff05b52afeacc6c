mod balance;
mod engine;
mod host;
mod runner;

pub use balance::{BalanceCache, GrantId, GrantOutcome};
pub use engine::{GrantRequest, Session, SessionSettings, MAX_INTERVAL_SECS};
pub use host::{SessionHandle, SessionHost};
pub use runner::{RunnerInputs, SessionRunner, SessionSummary, SessionView};
