// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::types::ConcurrencyPolicy;

use super::core::{CoreCommand, ScheduledTask, SchedulerCore};
use super::{IntentTag, RuntimeEvent, TaskContext};

/// Async shell around [`SchedulerCore`].
///
/// Reads [`RuntimeEvent`]s, feeds them to the core and carries out the
/// resulting commands: spawning task instances on the Tokio runtime and
/// cancelling superseded `Latest` instances.
pub struct Runtime {
    core: SchedulerCore,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    ctx: TaskContext,
    /// Cancel handles of live `Latest` instances.
    cancels: HashMap<u64, oneshot::Sender<()>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// `ctx.intents` must feed the same channel as `event_rx`, otherwise
    /// task completions never reach the core.
    pub fn new(core: SchedulerCore, event_rx: mpsc::Receiver<RuntimeEvent>, ctx: TaskContext) -> Self {
        Self {
            core,
            event_rx,
            ctx,
            cancels: HashMap::new(),
        }
    }

    /// Main event loop; returns on shutdown, on idle in `exit_when_idle`
    /// mode, or when every sender is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("vmflow runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            if let RuntimeEvent::TaskFinished { instance, .. } = event {
                self.cancels.remove(&instance);
            }

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        // Dropping the cancel senders stops every remaining `Latest` task.
        self.cancels.clear();
        info!("runtime exiting");
        Ok(())
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Spawn(task) => self.spawn_task(task),
            CoreCommand::Cancel { tag, instance } => self.cancel_task(tag, instance),
            CoreCommand::RequestExit => info!("core issued RequestExit command"),
        }
    }

    fn spawn_task(&mut self, task: ScheduledTask) {
        let tag = task.intent.tag();
        let Some(registration) = self.core.table().get(tag) else {
            warn!(%tag, "scheduled task has no registration; skipping");
            return;
        };

        let instance = task.instance;
        let future = registration.start(self.ctx.clone(), task.intent);
        let events = self.ctx.intents.clone();

        match task.policy {
            ConcurrencyPolicy::Every => {
                tokio::spawn(async move {
                    future.await;
                    events
                        .send_event(RuntimeEvent::TaskFinished {
                            tag,
                            instance,
                            cancelled: false,
                        })
                        .await;
                });
            }
            ConcurrencyPolicy::Latest => {
                let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
                self.cancels.insert(instance, cancel_tx);

                tokio::spawn(async move {
                    // Either the task runs to completion, or it is dropped at
                    // its current await point when cancelled (or when the
                    // runtime goes away and the sender is dropped).
                    let cancelled = tokio::select! {
                        _ = future => false,
                        _ = &mut cancel_rx => true,
                    };
                    if cancelled {
                        debug!(%tag, instance, "task instance cancelled");
                    }
                    events
                        .send_event(RuntimeEvent::TaskFinished {
                            tag,
                            instance,
                            cancelled,
                        })
                        .await;
                });
            }
        }
    }

    fn cancel_task(&mut self, tag: IntentTag, instance: u64) {
        match self.cancels.remove(&instance) {
            Some(cancel) => {
                info!(%tag, instance, "cancelling superseded task instance");
                if cancel.send(()).is_err() {
                    debug!(%tag, instance, "instance already finished while cancelling");
                }
            }
            None => debug!(%tag, instance, "no cancel handle; instance already gone"),
        }
    }
}
