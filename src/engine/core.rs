// src/engine/core.rs

//! Pure scheduler core.
//!
//! Consumes [`RuntimeEvent`]s and decides which task instances to start and
//! which to cancel, according to each tag's [`ConcurrencyPolicy`]. It owns no
//! channels and spawns nothing; the async shell in [`super::runtime`] carries
//! out the returned commands.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::engine::dispatch_table::DispatchTable;
use crate::engine::{Intent, IntentTag, RuntimeEvent, RuntimeOptions};
use crate::types::ConcurrencyPolicy;

/// A task instance the shell should start now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    /// Monotonically increasing, unique per dispatch.
    pub instance: u64,
    pub policy: ConcurrencyPolicy,
    pub intent: Intent,
}

/// Command produced by the core for the IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    Spawn(ScheduledTask),
    /// Cancel a superseded `Latest` instance at its current suspension point.
    Cancel { tag: IntentTag, instance: u64 },
    /// Nothing left to run (only with `exit_when_idle`).
    RequestExit,
}

/// Decision returned after handling one event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Scheduler state: the dispatch table plus the set of live instances.
#[derive(Debug)]
pub struct SchedulerCore {
    table: DispatchTable,
    options: RuntimeOptions,
    /// Every live instance, including cancelled ones that have not yet
    /// reported back.
    running: HashMap<u64, IntentTag>,
    /// Newest instance per `Latest` tag.
    latest: HashMap<IntentTag, u64>,
    next_instance: u64,
}

impl SchedulerCore {
    pub fn new(table: DispatchTable, options: RuntimeOptions) -> Self {
        Self {
            table,
            options,
            running: HashMap::new(),
            latest: HashMap::new(),
            next_instance: 1,
        }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Handle a single event and return the commands for the shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::Dispatch(intent) => CoreStep::running(self.handle_dispatch(intent)),
            RuntimeEvent::TaskFinished {
                tag,
                instance,
                cancelled,
            } => self.handle_finished(tag, instance, cancelled),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }

    fn handle_dispatch(&mut self, intent: Intent) -> Vec<CoreCommand> {
        let tag = intent.tag();
        let Some(policy) = self.table.policy_of(tag) else {
            warn!(%tag, "no handler registered for intent; ignoring dispatch");
            return Vec::new();
        };

        let instance = self.next_instance;
        self.next_instance += 1;

        let mut commands = Vec::new();
        if policy == ConcurrencyPolicy::Latest {
            if let Some(previous) = self.latest.insert(tag, instance) {
                if self.running.contains_key(&previous) {
                    info!(%tag, previous, instance, "superseding running instance");
                    commands.push(CoreCommand::Cancel {
                        tag,
                        instance: previous,
                    });
                }
            }
        }

        debug!(%tag, instance, %policy, "scheduling task instance");
        self.running.insert(instance, tag);
        commands.push(CoreCommand::Spawn(ScheduledTask {
            instance,
            policy,
            intent,
        }));
        commands
    }

    fn handle_finished(&mut self, tag: IntentTag, instance: u64, cancelled: bool) -> CoreStep {
        debug!(%tag, instance, cancelled, "task instance finished");
        self.running.remove(&instance);
        if self.latest.get(&tag) == Some(&instance) {
            self.latest.remove(&tag);
        }

        if self.options.exit_when_idle && self.is_idle() {
            return CoreStep {
                commands: vec![CoreCommand::RequestExit],
                keep_running: false,
            };
        }
        CoreStep::running(Vec::new())
    }
}
