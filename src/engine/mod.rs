// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`intent`]: the tagged requests the presentation layer dispatches.
//! - [`dispatch_table`]: static tag → handler + policy registration.
//! - [`core`]: pure scheduling decisions (`Every` vs `Latest`).
//! - [`runtime`]: the async shell that spawns and cancels task instances.
//! - [`invoker`]: the uniform error channel for external calls.
//! - [`context`]: the dependencies handed to every task.

pub mod context;
pub mod core;
pub mod dispatch_table;
pub mod intent;
pub mod invoker;
pub mod messages;
pub mod runtime;

pub use context::{IntentSender, TaskContext};
pub use core::{CoreCommand, CoreStep, ScheduledTask, SchedulerCore};
pub use dispatch_table::{DispatchTable, Registration, TaskFuture};
pub use intent::{ConsoleRequest, Intent, IntentTag, LoginRequest, RdpRequest};
pub use invoker::invoke;
pub use runtime::Runtime;

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Stop once no task instance is running (used for `--once`).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Start a task for this intent.
    Dispatch(Intent),
    /// A task instance returned or was cancelled.
    TaskFinished {
        tag: IntentTag,
        instance: u64,
        cancelled: bool,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}
