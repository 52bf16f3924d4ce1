// src/store/memory.rs

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use super::reducer::reduce;
use super::{AppState, StateUpdate, Store};

/// Capacity of the update channel; slower subscribers see `Lagged`.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// In-process store with a subscription channel.
///
/// Snapshots are `Arc`-shared; an update clones the state only while a
/// previous snapshot is still held by a reader. Applied updates are not
/// retained: observers subscribe.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<Arc<AppState>>,
    updates: broadcast::Sender<StateUpdate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(Arc::new(AppState::default())),
            updates,
        }
    }

    /// Receive every update applied from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn apply(&self, update: StateUpdate) {
        trace!(?update, "applying state update");
        {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            reduce(Arc::make_mut(&mut guard), &update);
        }
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[test]
    fn subscribers_see_updates_in_order() {
        let store = MemoryStore::new();
        store.apply(StateUpdate::TokenExpired);

        let mut updates = store.subscribe();
        store.apply(StateUpdate::LoginFailed {
            error_code: "no-access".to_string(),
            message: None,
        });
        store.apply(StateUpdate::TokenExpired);

        assert!(matches!(updates.try_recv(), Ok(StateUpdate::LoginFailed { .. })));
        assert_eq!(updates.try_recv(), Ok(StateUpdate::TokenExpired));
        assert_eq!(updates.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(store.state().login.error_code.as_deref(), Some("no-access"));
    }

    #[test]
    fn lagging_subscriber_is_told_how_much_it_missed() {
        let store = MemoryStore::new();
        let mut updates = store.subscribe();
        for _ in 0..UPDATE_CHANNEL_CAPACITY + 4 {
            store.apply(StateUpdate::TokenExpired);
        }

        assert_eq!(updates.try_recv(), Err(TryRecvError::Lagged(4)));
        assert_eq!(updates.try_recv(), Ok(StateUpdate::TokenExpired));
    }

    #[test]
    fn snapshots_are_unaffected_by_later_updates() {
        let store = MemoryStore::new();
        let before = store.state();
        store.apply(StateUpdate::LoginFailed {
            error_code: "no-access".to_string(),
            message: None,
        });

        assert!(before.login.error_code.is_none());
        assert!(store.state().login.error_code.is_some());
    }
}
