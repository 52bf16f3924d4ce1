// src/workflows/events.rs

//! Event refresh loop.
//!
//! Polls the engine's event stream and turns each batch into targeted
//! refreshes: one [`Intent::RefreshResource`] per distinct host, VM,
//! template or cluster referenced in the batch.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::wrong_intent;
use crate::api::{Event, ResourceRef};
use crate::engine::{invoke, Intent, IntentTag, TaskContext};

/// Index of the last processed event. Lives as long as the process.
///
/// `None` until the first successful poll primes it.
#[derive(Debug, Default)]
pub struct EventCursor {
    index: Mutex<Option<u64>>,
}

impl EventCursor {
    pub fn get(&self) -> Option<u64> {
        *self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance to `index`; the cursor never moves backwards.
    pub fn advance(&self, index: u64) {
        let mut current = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        *current = Some(current.map_or(index, |c| c.max(index)));
    }
}

/// Compute the next cursor and the refresh intents for one batch.
///
/// Without a previous cursor the batch only primes the cursor: there is no
/// earlier state those events could have invalidated. An empty priming batch
/// means the engine has no events yet, so the cursor starts at 0 and
/// everything after it counts as new. Events at or below `since` are ignored.
pub fn plan_refreshes(since: Option<u64>, events: &[Event]) -> (u64, Vec<Intent>) {
    let newest = events.iter().map(|e| e.index).max();
    let next = since.max(newest).unwrap_or(0);

    let Some(since) = since else {
        return (next, Vec::new());
    };

    let mut resources = BTreeSet::new();
    for event in events.iter().filter(|e| e.index > since) {
        if let Some(id) = &event.vm_id {
            resources.insert(ResourceRef::Vm(id.clone()));
        }
        if let Some(id) = &event.host_id {
            resources.insert(ResourceRef::Host(id.clone()));
        }
        if let Some(id) = &event.template_id {
            resources.insert(ResourceRef::Template(id.clone()));
        }
        if let Some(id) = &event.cluster_id {
            resources.insert(ResourceRef::Cluster(id.clone()));
        }
    }

    let intents = resources.into_iter().map(Intent::RefreshResource).collect();
    (next, intents)
}

/// Runs until cancelled or until the engine stops authorizing the poll.
pub async fn poll_events(ctx: TaskContext, intent: Intent, cursor: Arc<EventCursor>) {
    if !matches!(intent, Intent::StartEventPolling) {
        return wrong_intent(IntentTag::StartEventPolling, &intent);
    }

    let interval = ctx.settings.events.interval();
    info!(?interval, cursor = ?cursor.get(), "event polling started");

    loop {
        let since = cursor.get();
        // A failing poll is retried on the next tick rather than reported.
        match invoke(&ctx, "getEvents", &intent, true, ctx.api.get_events(since)).await {
            Ok(events) => {
                let (next, refreshes) = plan_refreshes(since, &events);
                cursor.advance(next);
                if !refreshes.is_empty() {
                    debug!(
                        events = events.len(),
                        refreshes = refreshes.len(),
                        cursor = next,
                        "dispatching event-driven refreshes"
                    );
                }
                for refresh in refreshes {
                    ctx.dispatch(refresh).await;
                }
            }
            Err(error) if matches!(error.status, Some(401) | Some(403)) => {
                warn!(%error, "event polling no longer authorized; stopping");
                return;
            }
            Err(error) => debug!(%error, "event poll failed; retrying next tick"),
        }

        sleep(interval).await;
    }
}
