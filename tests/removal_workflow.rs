// tests/removal_workflow.rs

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use vmflow::api::{ApiError, ResourceRef};
use vmflow::engine::Intent;
use vmflow::store::{StateUpdate, Store};
use vmflow::types::{PendingKind, PendingTask};
use vmflow::workflows::removal::{remove_disk, remove_snapshot};
use vmflow_test_utils::{init_tracing, ConfigFileBuilder, Harness};

fn disk_removal(disk: &str, vm: Option<&str>) -> Intent {
    Intent::RemoveDisk {
        disk_id: disk.to_string(),
        vm_id: vm.map(str::to_string),
    }
}

fn count(updates: &[StateUpdate], pred: impl Fn(&StateUpdate) -> bool) -> usize {
    updates.iter().filter(|u| pred(u)).count()
}

#[tokio::test(start_paused = true)]
async fn disk_removal_confirms_on_404_and_refreshes_once() {
    init_tracing();
    let mut h = Harness::with_defaults();
    let disk = ResourceRef::Disk("disk-1".to_string());

    for status in ["locked", "locked", "locked"] {
        h.api.push_resource(disk.clone(), Ok(json!({ "id": "disk-1", "status": status })));
    }
    h.api
        .push_resource(disk.clone(), Err(ApiError::new(404, "gone")));

    let start = Instant::now();
    remove_disk(h.ctx.clone(), disk_removal("disk-1", Some("vm-1"))).await;

    assert_eq!(h.api.count("remove_resource"), 1);
    assert_eq!(h.api.count("get_resource"), 4);
    // Three default backoffs between four fetches.
    assert_eq!(start.elapsed(), Duration::from_secs(12));

    let pending = PendingTask::new(PendingKind::DiskRemoval, "disk-1");
    let updates = h.updates();
    assert_eq!(
        count(&updates, |u| *u == StateUpdate::AddPendingTask(pending.clone())),
        1
    );
    assert_eq!(
        count(&updates, |u| *u == StateUpdate::RemovePendingTask(pending.clone())),
        1
    );
    assert_eq!(
        count(&updates, |u| matches!(u, StateUpdate::SetResource { .. })),
        3,
        "every intermediate snapshot is published"
    );
    assert!(updates.contains(&StateUpdate::ResourceRemoved(disk.clone())));
    assert!(h.store.state().notifications.is_empty(), "404 during the poll is expected");

    assert_eq!(
        h.dispatched(),
        vec![Intent::FetchVmDisks {
            vm_id: "vm-1".to_string()
        }]
    );
    assert!(!h.store.state().is_pending(&pending));
}

#[tokio::test(start_paused = true)]
async fn refresh_comes_after_the_pending_task_is_cleared() {
    init_tracing();
    let mut h = Harness::with_defaults();

    remove_disk(h.ctx.clone(), disk_removal("disk-2", Some("vm-1"))).await;

    let updates = h.updates();
    let removed_at = updates
        .iter()
        .position(|u| matches!(u, StateUpdate::RemovePendingTask(_)))
        .unwrap();
    let confirmed_at = updates
        .iter()
        .position(|u| matches!(u, StateUpdate::ResourceRemoved(_)))
        .unwrap();
    assert!(removed_at < confirmed_at);
    assert_eq!(h.dispatched().len(), 1);
}

#[tokio::test]
async fn rejected_delete_stops_without_pending_task() {
    init_tracing();
    let mut h = Harness::with_defaults();
    h.api.set_remove(Err(ApiError::new(409, "Cannot remove disk: VM is running")));

    remove_disk(h.ctx.clone(), disk_removal("disk-1", Some("vm-1"))).await;

    assert_eq!(h.api.count("get_resource"), 0);
    let state = h.store.state();
    assert!(state.pending_tasks.is_empty());
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].summary, "Failed to remove disk");
    assert!(
        !h.updates()
            .iter()
            .any(|u| matches!(u, StateUpdate::AddPendingTask(_)))
    );
    assert!(h.dispatched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_removal_clears_pending_without_refresh() {
    init_tracing();
    let mut h = Harness::new(ConfigFileBuilder::new().with_disk_removal(3, &[1_000]).build());
    let disk = ResourceRef::Disk("disk-1".to_string());
    h.api.push_resource(disk.clone(), Ok(json!({ "status": "locked" })));

    remove_disk(h.ctx.clone(), disk_removal("disk-1", Some("vm-1"))).await;

    assert_eq!(h.api.count("get_resource"), 3);
    assert!(h.store.state().pending_tasks.is_empty());
    assert!(!h.updates().contains(&StateUpdate::ResourceRemoved(disk)));
    assert!(h.dispatched().is_empty());
}

#[tokio::test]
async fn duplicate_request_is_ignored_while_pending() {
    init_tracing();
    let h = Harness::with_defaults();
    let pending = PendingTask::new(PendingKind::DiskRemoval, "disk-1");
    h.store.apply(StateUpdate::AddPendingTask(pending.clone()));

    remove_disk(h.ctx.clone(), disk_removal("disk-1", None)).await;

    assert!(h.api.calls().is_empty());
    assert!(h.store.state().is_pending(&pending), "the owning task keeps its entry");
}

#[tokio::test(start_paused = true)]
async fn concurrent_removals_of_different_disks_are_independent() {
    init_tracing();
    let mut h = Harness::with_defaults();

    tokio::join!(
        remove_disk(h.ctx.clone(), disk_removal("disk-a", Some("vm-1"))),
        remove_disk(h.ctx.clone(), disk_removal("disk-b", Some("vm-1"))),
    );

    assert_eq!(h.api.count("remove_resource"), 2);
    assert!(h.store.state().pending_tasks.is_empty());
    assert_eq!(h.dispatched().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn snapshot_removal_refreshes_the_snapshot_list() {
    init_tracing();
    let mut h = Harness::with_defaults();
    let snapshot = ResourceRef::Snapshot {
        vm_id: "vm-1".to_string(),
        snapshot_id: "snap-1".to_string(),
    };
    h.api.push_resource(snapshot.clone(), Ok(json!({ "snapshot_status": "locked" })));
    h.api.push_resource(snapshot.clone(), Err(ApiError::new(404, "gone")));

    remove_snapshot(
        h.ctx.clone(),
        Intent::RemoveSnapshot {
            vm_id: "vm-1".to_string(),
            snapshot_id: "snap-1".to_string(),
        },
    )
    .await;

    let pending = PendingTask::new(PendingKind::SnapshotRemoval, "snap-1");
    let updates = h.updates();
    assert!(updates.contains(&StateUpdate::AddPendingTask(pending.clone())));
    assert!(updates.contains(&StateUpdate::RemovePendingTask(pending)));
    assert_eq!(
        h.dispatched(),
        vec![Intent::FetchVmSnapshots {
            vm_id: "vm-1".to_string()
        }]
    );
}
