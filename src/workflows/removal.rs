// src/workflows/removal.rs

//! Disk and snapshot removal.
//!
//! A delete call only means the engine accepted the request. The resource
//! is tracked as a [`PendingTask`] until a re-fetch answers 404, and the
//! dependent list is refreshed only then.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::wrong_intent;
use crate::api::{CallResult, ResourceRef};
use crate::engine::{invoke, Intent, IntentTag, TaskContext};
use crate::store::StateUpdate;
use crate::types::{PendingKind, PendingTask};
use crate::wait::{poll_until, PollPolicy};

pub async fn remove_disk(ctx: TaskContext, intent: Intent) {
    let Intent::RemoveDisk { disk_id, vm_id } = &intent else {
        return wrong_intent(IntentTag::RemoveDisk, &intent);
    };

    let refresh = vm_id.clone().map(|vm_id| Intent::FetchVmDisks { vm_id });
    let policy = ctx.settings.polling.disk_removal.policy();
    remove_and_confirm(
        &ctx,
        &intent,
        ResourceRef::Disk(disk_id.clone()),
        PendingKind::DiskRemoval,
        &policy,
        refresh,
    )
    .await;
}

pub async fn remove_snapshot(ctx: TaskContext, intent: Intent) {
    let Intent::RemoveSnapshot { vm_id, snapshot_id } = &intent else {
        return wrong_intent(IntentTag::RemoveSnapshot, &intent);
    };

    let resource = ResourceRef::Snapshot {
        vm_id: vm_id.clone(),
        snapshot_id: snapshot_id.clone(),
    };
    let refresh = Intent::FetchVmSnapshots {
        vm_id: vm_id.clone(),
    };
    let policy = ctx.settings.polling.snapshot_removal.policy();
    remove_and_confirm(
        &ctx,
        &intent,
        resource,
        PendingKind::SnapshotRemoval,
        &policy,
        Some(refresh),
    )
    .await;
}

/// Delete `resource`, then poll until it is gone.
///
/// Returns `true` once the removal is confirmed. While polling, every
/// re-fetched snapshot of the resource is published so observers see its
/// live status. The pending task is removed whatever the outcome.
pub async fn remove_and_confirm(
    ctx: &TaskContext,
    origin: &Intent,
    resource: ResourceRef,
    kind: PendingKind,
    policy: &PollPolicy,
    refresh: Option<Intent>,
) -> bool {
    let pending = PendingTask::new(kind, resource.id());
    if ctx.store.state().is_pending(&pending) {
        info!(%resource, "removal already in progress; ignoring request");
        return false;
    }

    if invoke(ctx, "removeResource", origin, false, ctx.api.remove_resource(&resource))
        .await
        .is_err()
    {
        return false;
    }

    // Another removal of the same resource may have been accepted while the
    // delete call was in flight; that task owns the bookkeeping.
    if ctx.store.state().is_pending(&pending) {
        info!(%resource, "removal already tracked by another task");
        return false;
    }
    ctx.store.apply(StateUpdate::AddPendingTask(pending.clone()));
    debug!(%resource, "removal accepted; waiting for confirmation");

    let outcome = poll_until(
        policy,
        || invoke(ctx, "getResource", origin, true, ctx.api.get_resource(&resource)),
        |result: &CallResult<Value>| matches!(result, Err(error) if error.is_not_found()),
        |result: &CallResult<Value>| {
            if let Ok(value) = result {
                ctx.store.apply(StateUpdate::SetResource {
                    resource: resource.clone(),
                    value: value.clone(),
                });
            }
        },
    )
    .await;

    ctx.store.apply(StateUpdate::RemovePendingTask(pending));

    if !outcome.is_satisfied() {
        warn!(
            %resource,
            attempts = outcome.attempts(),
            "removal not confirmed within the polling budget"
        );
        return false;
    }

    info!(%resource, attempts = outcome.attempts(), "removal confirmed");
    ctx.store.apply(StateUpdate::ResourceRemoved(resource));
    if let Some(refresh) = refresh {
        ctx.dispatch(refresh).await;
    }
    true
}
