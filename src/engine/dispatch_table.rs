// src/engine/dispatch_table.rs

//! Static registration of intent handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use crate::engine::{Intent, IntentTag, TaskContext};
use crate::errors::{Result, VmflowError};
use crate::types::ConcurrencyPolicy;

/// Future of one task instance.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Type-erased intent handler.
pub type Handler = Arc<dyn Fn(TaskContext, Intent) -> TaskFuture + Send + Sync>;

/// Handler plus its concurrency policy.
#[derive(Clone)]
pub struct Registration {
    pub policy: ConcurrencyPolicy,
    handler: Handler,
}

impl Registration {
    /// Build the task future for one dispatched intent.
    pub fn start(&self, ctx: TaskContext, intent: Intent) -> TaskFuture {
        (self.handler)(ctx, intent)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Tag → handler table, built once at startup.
#[derive(Debug, Default, Clone)]
pub struct DispatchTable {
    entries: BTreeMap<IntentTag, Registration>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `tag`. A second registration replaces the first.
    pub fn register<F, Fut>(&mut self, tag: IntentTag, handler: F, policy: ConcurrencyPolicy)
    where
        F: Fn(TaskContext, Intent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |ctx: TaskContext, intent: Intent| -> TaskFuture {
                Box::pin(handler(ctx, intent))
            });
        if self
            .entries
            .insert(tag, Registration { policy, handler })
            .is_some()
        {
            warn!(%tag, "handler registered twice; keeping the latest registration");
        }
    }

    pub fn get(&self, tag: IntentTag) -> Option<&Registration> {
        self.entries.get(&tag)
    }

    pub fn policy_of(&self, tag: IntentTag) -> Option<ConcurrencyPolicy> {
        self.entries.get(&tag).map(|r| r.policy)
    }

    /// Registered tags and policies, in tag order.
    pub fn registrations(&self) -> impl Iterator<Item = (IntentTag, ConcurrencyPolicy)> + '_ {
        self.entries.iter().map(|(tag, r)| (*tag, r.policy))
    }

    /// Fail unless every [`IntentTag`] has a handler.
    pub fn audit(&self) -> Result<()> {
        let missing: Vec<&str> = IntentTag::ALL
            .iter()
            .filter(|tag| !self.entries.contains_key(tag))
            .map(|tag| tag.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(VmflowError::UnregisteredIntents(missing.join(", ")))
        }
    }
}
