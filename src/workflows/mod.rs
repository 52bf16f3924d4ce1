// src/workflows/mod.rs

//! Task programs run by the runtime, one per intent tag.
//!
//! - [`login`]: authentication, version/permission/capability checks, then
//!   the bulk load and background loops.
//! - [`reference`]: the reference-data load plan and list/page fetches.
//! - [`removal`]: disk and snapshot removal with confirmation polling.
//! - [`disk`]: disk create/edit followed by the unlock wait.
//! - [`console`]: console descriptor and RDP file generation.
//! - [`events`]: the event refresh loop.
//! - [`refresh`]: the fixed-delay VM list refresh.

use std::sync::Arc;

use tracing::error;

use crate::engine::{DispatchTable, Intent, IntentTag, TaskContext};
use crate::types::ConcurrencyPolicy::{Every, Latest};

pub mod console;
pub mod disk;
pub mod events;
pub mod login;
pub mod reference;
pub mod refresh;
pub mod removal;

/// Dispatch table with every intent registered.
pub fn default_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    register_all(&mut table);
    table
}

/// Register every workflow under its tag and concurrency policy.
///
/// Session-wide flows (login, list loads, background loops) are `Latest`:
/// a new dispatch supersedes the running one. Per-resource mutations are
/// `Every` so concurrent actions on different resources never cancel each
/// other.
pub fn register_all(table: &mut DispatchTable) {
    table.register(IntentTag::Authenticate, login::authenticate, Latest);
    table.register(IntentTag::Login, login::login, Latest);

    table.register(IntentTag::FetchReferenceList, reference::fetch_reference_list_task, Every);
    table.register(IntentTag::FetchVmsPage, reference::fetch_vms_page, Latest);
    table.register(IntentTag::RefreshVms, reference::refresh_vms, Latest);
    table.register(IntentTag::RefreshResource, reference::refresh_resource, Every);
    table.register(IntentTag::FetchVmDisks, reference::fetch_vm_disks, Every);
    table.register(IntentTag::FetchVmSnapshots, reference::fetch_vm_snapshots, Every);

    table.register(IntentTag::RemoveDisk, removal::remove_disk, Every);
    table.register(IntentTag::RemoveSnapshot, removal::remove_snapshot, Every);
    table.register(IntentTag::SaveDisk, disk::save_disk, Every);

    table.register(IntentTag::OpenConsole, console::open_console, Every);
    table.register(IntentTag::OpenRdp, console::open_rdp, Every);

    table.register(IntentTag::StartSchedulerFixedDelay, refresh::scheduler_fixed_delay, Latest);

    let cursor = Arc::new(events::EventCursor::default());
    table.register(
        IntentTag::StartEventPolling,
        move |ctx: TaskContext, intent: Intent| events::poll_events(ctx, intent, Arc::clone(&cursor)),
        Latest,
    );
}

/// Handlers are only ever started for their own tag; anything else is a
/// registration bug.
pub(crate) fn wrong_intent(expected: IntentTag, intent: &Intent) {
    error!(%expected, actual = %intent.tag(), "handler received an intent of another kind");
}
