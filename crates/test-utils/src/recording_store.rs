use std::sync::{Arc, Mutex};

use vmflow::store::{AppState, MemoryStore, StateUpdate, Store};

/// [`MemoryStore`] that also remembers every update it applied, so tests
/// can assert on the exact sequence a workflow published.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    applied: Mutex<Vec<StateUpdate>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All updates applied so far, in order.
    pub fn applied(&self) -> Vec<StateUpdate> {
        self.applied.lock().unwrap().clone()
    }
}

impl Store for RecordingStore {
    fn state(&self) -> Arc<AppState> {
        self.inner.state()
    }

    fn apply(&self, update: StateUpdate) {
        // Held across the apply so the log order is the apply order.
        let mut applied = self.applied.lock().unwrap();
        applied.push(update.clone());
        self.inner.apply(update);
    }
}
