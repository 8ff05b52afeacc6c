//! Input-activity sources.
//!
//! A source exposes a single capability, `on_activity(callback)`, which
//! returns a listener guard. Dropping the guard deregisters the callback, so
//! a torn-down session cannot leak listeners.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Coarse-grained interaction signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Pointer,
    Keyboard,
    Touch,
    Scroll,
}

pub type ActivityCallback = Box<dyn Fn(ActivityKind) + Send + Sync>;

pub trait ActivitySource: Send + Sync {
    /// Register a callback invoked on every interaction.
    fn on_activity(&self, callback: ActivityCallback) -> ActivityListener;
}

type Registry = Arc<Mutex<BTreeMap<u64, Arc<dyn Fn(ActivityKind) + Send + Sync>>>>;

/// RAII registration returned by [`ActivitySource::on_activity`].
#[must_use = "dropping the listener deregisters the callback"]
pub struct ActivityListener {
    id: u64,
    registry: Registry,
}

impl Drop for ActivityListener {
    fn drop(&mut self) {
        if let Ok(mut callbacks) = self.registry.lock() {
            callbacks.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for ActivityListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityListener").field("id", &self.id).finish()
    }
}

/// In-process fan-out source. Input adapters call [`ActivityBus::emit`].
#[derive(Clone, Default)]
pub struct ActivityBus {
    registry: Registry,
    next_id: Arc<AtomicU64>,
}

impl ActivityBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one interaction to every registered callback.
    pub fn emit(&self, kind: ActivityKind) {
        // Snapshot so callbacks may register or drop listeners re-entrantly.
        let callbacks: Vec<_> = match self.registry.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(kind);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl ActivitySource for ActivityBus {
    fn on_activity(&self, callback: ActivityCallback) -> ActivityListener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut callbacks) = self.registry.lock() {
            callbacks.insert(id, Arc::from(callback));
        }
        ActivityListener {
            id,
            registry: Arc::clone(&self.registry),
        }
    }
}
