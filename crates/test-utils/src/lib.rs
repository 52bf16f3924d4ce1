pub mod builders;
pub mod downloader;
pub mod fake_api;
pub mod recording_store;

use std::sync::{Arc, Once};

use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};
use vmflow::config::ConfigFile;
use vmflow::engine::{Intent, IntentSender, RuntimeEvent, TaskContext};
use vmflow::store::StateUpdate;

pub use builders::ConfigFileBuilder;
pub use downloader::RecordingDownloader;
pub use fake_api::FakeApi;
pub use recording_store::RecordingStore;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Everything a workflow test needs: a [`TaskContext`] wired to fakes, and
/// the receiving end of the intent channel.
///
/// Handlers are called directly (`login(h.ctx.clone(), intent).await`);
/// whatever they dispatch is collected from `events`.
pub struct Harness {
    pub ctx: TaskContext,
    pub api: Arc<FakeApi>,
    pub store: Arc<RecordingStore>,
    pub downloader: Arc<RecordingDownloader>,
    pub events: mpsc::Receiver<RuntimeEvent>,
    pub sender: mpsc::Sender<RuntimeEvent>,
}

impl Harness {
    pub fn new(config: ConfigFile) -> Self {
        let api = Arc::new(FakeApi::new());
        let store = Arc::new(RecordingStore::new());
        let downloader = Arc::new(RecordingDownloader::new());
        let (sender, events) = mpsc::channel(1024);

        let ctx = TaskContext::new(
            api.clone(),
            store.clone(),
            IntentSender::new(sender.clone()),
            downloader.clone(),
            Arc::new(config),
        );

        Self {
            ctx,
            api,
            store,
            downloader,
            events,
            sender,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ConfigFileBuilder::new().build())
    }

    /// Intents dispatched since the last call.
    pub fn dispatched(&mut self) -> Vec<Intent> {
        let mut intents = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let RuntimeEvent::Dispatch(intent) = event {
                intents.push(intent);
            }
        }
        intents
    }

    /// Every update the store has applied, in order.
    pub fn updates(&self) -> Vec<StateUpdate> {
        self.store.applied()
    }
}
