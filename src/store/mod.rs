// src/store/mod.rs

//! Shared state seen by the presentation layer.
//!
//! Workflows never mutate state directly: they read an immutable snapshot
//! through [`Store::state`] and publish [`StateUpdate`]s through
//! [`Store::apply`]. The reduction of updates into [`AppState`] lives in
//! [`reducer`]; [`memory::MemoryStore`] is the in-process implementation with
//! subscription.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use crate::api::{ApiError, Console, ReferenceKind, ResourceRef, VmChild};
use crate::engine::Intent;
use crate::types::{PendingTask, Version};

pub mod memory;
pub mod reducer;

pub use memory::MemoryStore;

/// Read/write handle to the state container.
///
/// Passed explicitly into every task so tests can substitute their own.
pub trait Store: Send + Sync {
    /// Current state snapshot. Cheap: the snapshot is shared, not copied.
    fn state(&self) -> Arc<AppState>;

    /// Publish an update. Applied synchronously before returning.
    fn apply(&self, update: StateUpdate);
}

/// Failure of an external call as shown in the audit/notification feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureNotification {
    pub summary: String,
    pub error: ApiError,
    pub intent: Intent,
}

/// Server limits for the CPU topology editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTopologyOptions {
    pub max_sockets: u32,
    pub max_cores_per_socket: u32,
    pub max_threads_per_core: u32,
    pub max_vcpus: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStatus {
    /// Another user holds the console; the UI offers a takeover.
    InUse,
    /// A connection file was handed to the downloader.
    Opened,
}

/// Everything published by workflows.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    LoginSuccessful {
        token: String,
        username: Option<String>,
        user_id: Option<String>,
    },
    LoginFailed {
        error_code: String,
        message: Option<String>,
    },
    TokenExpired,
    ApiVersion(Version),
    ApiIncompatible {
        required: Version,
        actual: Option<Version>,
        message: String,
    },
    Failure(FailureNotification),
    SetAdministrator(bool),
    SetFilter(bool),
    SetCpuTopologyOptions(CpuTopologyOptions),
    SetReferenceList {
        kind: ReferenceKind,
        items: Vec<Value>,
    },
    SetVmsPage {
        page: u32,
        vms: Vec<Value>,
    },
    SetPoolsPage {
        page: u32,
        pools: Vec<Value>,
    },
    SetResource {
        resource: ResourceRef,
        value: Value,
    },
    ResourceRemoved(ResourceRef),
    SetVmChildren {
        vm_id: String,
        child: VmChild,
        items: Vec<Value>,
    },
    AddPendingTask(PendingTask),
    RemovePendingTask(PendingTask),
    SetVmConsoles {
        vm_id: String,
        consoles: Vec<Console>,
    },
    SetConsoleStatus {
        vm_id: String,
        status: ConsoleStatus,
    },
    DiskFormError {
        vm_id: String,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginState {
    pub token: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub logged_in: bool,
    pub error_code: Option<String>,
    pub token_expired: bool,
}

/// The state container's contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub login: LoginState,
    pub api_version: Option<Version>,
    pub api_incompatible: Option<String>,
    pub administrator: bool,
    pub filter: bool,
    pub cpu_options: Option<CpuTopologyOptions>,
    pub references: BTreeMap<ReferenceKind, Vec<Value>>,
    pub vm_pages: BTreeMap<u32, Vec<Value>>,
    pub pool_pages: BTreeMap<u32, Vec<Value>>,
    pub resources: BTreeMap<ResourceRef, Value>,
    pub vm_children: BTreeMap<(String, VmChild), Vec<Value>>,
    pub pending_tasks: BTreeSet<PendingTask>,
    pub consoles: BTreeMap<String, Vec<Console>>,
    pub console_status: BTreeMap<String, ConsoleStatus>,
    pub disk_form_errors: BTreeMap<String, String>,
    pub notifications: Vec<FailureNotification>,
}

impl AppState {
    pub fn is_pending(&self, task: &PendingTask) -> bool {
        self.pending_tasks.contains(task)
    }

    /// Highest VM page loaded so far (0 before the first load).
    pub fn loaded_vm_pages(&self) -> u32 {
        self.vm_pages.keys().next_back().copied().unwrap_or(0)
    }

    pub fn reference(&self, kind: ReferenceKind) -> &[Value] {
        self.references.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}
