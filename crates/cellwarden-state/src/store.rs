//! [`StateStore`] – publish/read handle over the live [`DashboardSnapshot`].
//!
//! Clone it cheaply – all clones share the same snapshot. The internal lock
//! is held only for the duration of the copy or replace, never across a
//! transport or inference call; the control loop builds its next snapshot
//! on an owned working copy and swaps it in wholesale.

use std::sync::{Arc, Mutex};

use tracing::debug;

use cellwarden_types::{DashboardSnapshot, DisplaySettings};

/// Concurrency-safe holder of the latest published state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Mutex<DashboardSnapshot>>,
}

impl StateStore {
    /// Create a store seeded with an empty snapshot for `settings`.
    pub fn new(settings: DisplaySettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DashboardSnapshot::new(settings))),
        }
    }

    /// Replace the live snapshot with a freshly constructed one.
    pub fn publish(&self, snapshot: DashboardSnapshot) {
        debug!(
            log_lines = snapshot.log_tail.len(),
            has_telemetry = snapshot.telemetry.is_some(),
            "publishing dashboard snapshot"
        );
        let mut guard = self.inner.lock().expect("state store lock poisoned");
        *guard = snapshot;
    }

    /// An immutable copy of the latest published snapshot.
    pub fn read(&self) -> DashboardSnapshot {
        self.inner.lock().expect("state store lock poisoned").clone()
    }
}
