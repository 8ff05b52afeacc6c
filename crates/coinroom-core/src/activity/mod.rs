mod monitor;
mod source;

pub use monitor::{ActivityMonitor, ActivitySignal};
pub use source::{ActivityBus, ActivityCallback, ActivityKind, ActivityListener, ActivitySource};
