// src/engine/context.rs

//! Everything a running task may touch, handed over at spawn time.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::api::RemoteApi;
use crate::config::ConfigFile;
use crate::download::FileDownloader;
use crate::engine::{Intent, RuntimeEvent};
use crate::store::Store;

/// Cloneable handle for dispatching follow-up intents into the runtime.
#[derive(Debug, Clone)]
pub struct IntentSender {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl IntentSender {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    /// Queue `intent` for the scheduler. Dropped with a warning once the
    /// runtime has stopped.
    pub async fn dispatch(&self, intent: Intent) {
        let tag = intent.tag();
        if self.tx.send(RuntimeEvent::Dispatch(intent)).await.is_err() {
            warn!(%tag, "runtime stopped; dropping dispatched intent");
        }
    }

    pub(crate) async fn send_event(&self, event: RuntimeEvent) {
        let _ = self.tx.send(event).await;
    }
}

/// Explicit dependencies of a task: no module-level singletons.
#[derive(Clone)]
pub struct TaskContext {
    pub api: Arc<dyn RemoteApi>,
    pub store: Arc<dyn Store>,
    pub intents: IntentSender,
    pub downloader: Arc<dyn FileDownloader>,
    pub settings: Arc<ConfigFile>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("intents", &self.intents)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        store: Arc<dyn Store>,
        intents: IntentSender,
        downloader: Arc<dyn FileDownloader>,
        settings: Arc<ConfigFile>,
    ) -> Self {
        Self {
            api,
            store,
            intents,
            downloader,
            settings,
        }
    }

    pub async fn dispatch(&self, intent: Intent) {
        self.intents.dispatch(intent).await;
    }
}
