mod accrual;
mod queue;

pub use accrual::{AccrualState, AccrualTimer};
pub use queue::{FiredTimer, TimerHandle, TimerKind, TimerQueue};
