// tests/disk_workflow.rs

use serde_json::json;

use vmflow::api::{ApiError, DiskSpec, ResourceRef};
use vmflow::engine::Intent;
use vmflow::store::{StateUpdate, Store};
use vmflow::workflows::disk::save_disk;
use vmflow_test_utils::{init_tracing, ConfigFileBuilder, Harness};

fn save(vm: &str, disk_id: Option<&str>) -> Intent {
    Intent::SaveDisk {
        vm_id: vm.to_string(),
        disk: DiskSpec {
            disk_id: disk_id.map(str::to_string),
            attachment: json!({ "interface": "virtio_scsi", "disk": { "provisioned_size": 1024 } }),
        },
    }
}

#[tokio::test(start_paused = true)]
async fn created_disk_is_polled_until_unlocked() {
    init_tracing();
    let mut h = Harness::with_defaults();
    let disk = ResourceRef::Disk("new-disk".to_string());

    h.api
        .set_save_disk(Ok(json!({ "id": "new-disk", "disk": { "id": "new-disk" } })));
    h.api.push_resource(disk.clone(), Err(ApiError::new(404, "not yet")));
    h.api.push_resource(disk.clone(), Ok(json!({ "status": "locked" })));
    h.api.push_resource(disk.clone(), Ok(json!({ "status": "ok" })));

    save_disk(h.ctx.clone(), save("vm-1", None)).await;

    assert_eq!(h.api.count("save_disk"), 1);
    assert_eq!(h.api.count("get_resource"), 3);
    assert_eq!(
        h.store.state().resources.get(&disk),
        Some(&json!({ "status": "ok" }))
    );
    assert!(h.store.state().notifications.is_empty());
    assert_eq!(
        h.dispatched(),
        vec![Intent::FetchVmDisks {
            vm_id: "vm-1".to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn edited_disk_uses_the_requested_id() {
    init_tracing();
    let mut h = Harness::with_defaults();
    let disk = ResourceRef::Disk("disk-7".to_string());
    h.api.push_resource(disk.clone(), Ok(json!({ "status": "ok" })));

    save_disk(h.ctx.clone(), save("vm-1", Some("disk-7"))).await;

    assert!(h.api.calls().contains(&"save_disk vm-1 disk-7".to_string()));
    assert!(h.api.calls().contains(&"get_resource disk/disk-7".to_string()));
    assert_eq!(h.dispatched().len(), 1);
}

#[tokio::test]
async fn rejected_save_goes_to_the_form_not_the_feed() {
    init_tracing();
    let mut h = Harness::with_defaults();
    h.api
        .set_save_disk(Err(ApiError::new(400, "Disk size must be larger than current")));

    save_disk(h.ctx.clone(), save("vm-1", Some("disk-7"))).await;

    let state = h.store.state();
    assert!(state.notifications.is_empty());
    assert_eq!(
        state.disk_form_errors.get("vm-1").map(String::as_str),
        Some("Disk size must be larger than current")
    );
    assert_eq!(h.api.count("get_resource"), 0);
    assert!(h.dispatched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disk_that_stays_locked_still_refreshes_the_list() {
    init_tracing();
    let mut h = Harness::new(ConfigFileBuilder::new().with_disk_lock(4, &[500]).build());
    let disk = ResourceRef::Disk("disk-7".to_string());
    h.api.push_resource(disk, Ok(json!({ "status": "locked" })));

    save_disk(h.ctx.clone(), save("vm-1", Some("disk-7"))).await;

    assert_eq!(h.api.count("get_resource"), 4);
    assert!(
        h.updates()
            .iter()
            .all(|u| !matches!(u, StateUpdate::DiskFormError { .. }))
    );
    assert_eq!(h.dispatched().len(), 1);
}
