//! # Coinroom Core Library
//!
//! This library implements the activity-driven reward accrual engine: a
//! signed-in user earns coins for every minute they are actively using the
//! client. All durable state lives in an external ledger; the engine only
//! keeps an eventually-consistent view of the balance for display.
//!
//! ## Architecture
//!
//! - **Activity Monitor**: classifies the session as active or idle from
//!   interaction signals and a periodic inactivity sweep
//! - **Accrual Timer**: while active, fires one tick per interval
//! - **Balance Cache**: optimistic grants reconciled against the ledger's
//!   authoritative totals, with rollback on failure
//! - **Runner / Host**: tokio driver that owns a session per signed-in user
//!   and guarantees teardown on sign-out
//!
//! ## Key Components
//!
//! - [`Session`]: Wall-clock state machine for one user
//! - [`SessionHost`]: Identity-gated session lifecycle
//! - [`Ledger`]: Trait for the external balance store
//! - [`Config`]: Engine configuration management

pub mod activity;
pub mod clock;
pub mod error;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod session;
pub mod simulation;
pub mod storage;
pub mod timer;

pub use activity::{ActivityBus, ActivityKind, ActivityMonitor, ActivitySource};
pub use clock::{Clock, TokioClock};
pub use error::{ConfigError, CoreError, LedgerError, ValidationError};
pub use events::Event;
pub use identity::UserId;
pub use ledger::{HttpLedger, Ledger, MemoryLedger};
pub use session::{Session, SessionHandle, SessionHost, SessionSettings, SessionSummary, SessionView};
pub use simulation::{Scenario, SimulationReport, MAX_SCENARIO_SECS};
pub use storage::Config;
pub use timer::{AccrualTimer, TimerQueue};
