// tests/list_fetches.rs

use serde_json::json;

use vmflow::api::{ApiError, ReferenceKind, ResourceRef, VmChild};
use vmflow::engine::Intent;
use vmflow::store::{StateUpdate, Store};
use vmflow::workflows::reference::{
    fetch_reference_list_task, fetch_vm_disks, fetch_vms_page, refresh_resource, refresh_vms,
};
use vmflow_test_utils::{init_tracing, Harness};

#[tokio::test]
async fn page_fetch_loads_vms_and_pools_together() {
    init_tracing();
    let h = Harness::with_defaults();
    h.api.set_vms_page(2, vec![json!({ "id": "vm-51" })]);

    fetch_vms_page(h.ctx.clone(), Intent::FetchVmsPage { page: 2 }).await;

    let mut calls = h.api.calls();
    calls.sort();
    assert_eq!(calls, vec!["get_pools_page 2", "get_vms_page 2"]);
    let state = h.store.state();
    assert_eq!(state.vm_pages.get(&2).map(Vec::len), Some(1));
    assert!(state.pool_pages.contains_key(&2));
}

#[tokio::test]
async fn refresh_reloads_every_loaded_page() {
    init_tracing();
    let h = Harness::with_defaults();
    for page in 1..=3 {
        h.store.apply(StateUpdate::SetVmsPage { page, vms: vec![] });
    }

    refresh_vms(h.ctx.clone(), Intent::RefreshVms).await;

    assert_eq!(h.api.count("get_vms_page"), 3);
    assert_eq!(h.api.count("get_pools_page"), 3);
}

#[tokio::test]
async fn refresh_before_any_load_fetches_the_first_page() {
    init_tracing();
    let h = Harness::with_defaults();

    refresh_vms(h.ctx.clone(), Intent::RefreshVms).await;

    assert_eq!(h.api.count("get_vms_page"), 1);
    assert!(h.api.calls().contains(&"get_vms_page 1".to_string()));
}

#[tokio::test]
async fn refreshed_resource_replaces_the_stored_copy() {
    init_tracing();
    let h = Harness::with_defaults();
    let vm = ResourceRef::Vm("vm-1".to_string());
    h.api.push_resource(vm.clone(), Ok(json!({ "id": "vm-1", "status": "up" })));

    refresh_resource(h.ctx.clone(), Intent::RefreshResource(vm.clone())).await;

    assert_eq!(
        h.store.state().resources.get(&vm),
        Some(&json!({ "id": "vm-1", "status": "up" }))
    );
}

#[tokio::test]
async fn vanished_resource_is_dropped_from_the_store() {
    init_tracing();
    let h = Harness::with_defaults();
    let host = ResourceRef::Host("host-1".to_string());
    h.store.apply(StateUpdate::SetResource {
        resource: host.clone(),
        value: json!({ "id": "host-1" }),
    });

    refresh_resource(h.ctx.clone(), Intent::RefreshResource(host.clone())).await;

    assert!(!h.store.state().resources.contains_key(&host));
    assert!(h.store.state().notifications.is_empty());
}

#[tokio::test]
async fn failed_background_refresh_keeps_the_stored_copy_quietly() {
    init_tracing();
    let h = Harness::with_defaults();
    let vm = ResourceRef::Vm("vm-1".to_string());
    h.store.apply(StateUpdate::SetResource {
        resource: vm.clone(),
        value: json!({ "id": "vm-1" }),
    });
    h.api.push_resource(vm.clone(), Err(ApiError::new(503, "Service Unavailable")));

    refresh_resource(h.ctx.clone(), Intent::RefreshResource(vm.clone())).await;

    let state = h.store.state();
    assert!(state.resources.contains_key(&vm));
    assert!(state.notifications.is_empty());
}

#[tokio::test]
async fn vm_disks_are_stored_per_vm() {
    init_tracing();
    let h = Harness::with_defaults();
    h.api.set_children(
        "vm-1",
        VmChild::Disks,
        vec![json!({ "id": "att-1", "disk": { "id": "disk-1" } })],
    );

    fetch_vm_disks(
        h.ctx.clone(),
        Intent::FetchVmDisks {
            vm_id: "vm-1".to_string(),
        },
    )
    .await;

    let state = h.store.state();
    let disks = state
        .vm_children
        .get(&("vm-1".to_string(), VmChild::Disks))
        .expect("disks stored");
    assert_eq!(disks.len(), 1);
}

fn with_iso_domains(h: &Harness, domains: &[&str]) {
    h.store.apply(StateUpdate::SetReferenceList {
        kind: ReferenceKind::StorageDomains,
        items: domains
            .iter()
            .map(|id| json!({ "id": id, "type": "iso" }))
            .collect(),
    });
    h.store.apply(StateUpdate::SetReferenceList {
        kind: ReferenceKind::IsoFiles,
        items: vec![json!({ "id": "fedora.iso" })],
    });
}

#[tokio::test]
async fn iso_files_survive_when_every_domain_fails() {
    init_tracing();
    let h = Harness::with_defaults();
    with_iso_domains(&h, &["sd-iso"]);
    h.api
        .set_storage_domain_files("sd-iso", Err(ApiError::new(503, "Service Unavailable")));

    fetch_reference_list_task(h.ctx.clone(), Intent::FetchReferenceList(ReferenceKind::IsoFiles))
        .await;

    let state = h.store.state();
    assert_eq!(
        state.reference(ReferenceKind::IsoFiles),
        &[json!({ "id": "fedora.iso" })]
    );
    assert_eq!(state.notifications.len(), 1);
}

#[tokio::test]
async fn iso_files_keep_what_the_answering_domains_list() {
    init_tracing();
    let h = Harness::with_defaults();
    with_iso_domains(&h, &["sd-down", "sd-up"]);
    h.api
        .set_storage_domain_files("sd-down", Err(ApiError::new(503, "Service Unavailable")));
    h.api
        .set_storage_domain_files("sd-up", Ok(vec![json!({ "id": "debian.iso" })]));

    fetch_reference_list_task(h.ctx.clone(), Intent::FetchReferenceList(ReferenceKind::IsoFiles))
        .await;

    let state = h.store.state();
    assert_eq!(
        state.reference(ReferenceKind::IsoFiles),
        &[json!({ "id": "debian.iso" })]
    );
    assert_eq!(state.notifications.len(), 1);
}

#[tokio::test]
async fn iso_files_wait_for_storage_domains() {
    init_tracing();
    let h = Harness::with_defaults();
    h.store.apply(StateUpdate::SetReferenceList {
        kind: ReferenceKind::IsoFiles,
        items: vec![json!({ "id": "fedora.iso" })],
    });

    fetch_reference_list_task(h.ctx.clone(), Intent::FetchReferenceList(ReferenceKind::IsoFiles))
        .await;

    assert!(h.api.calls().is_empty());
    let state = h.store.state();
    assert_eq!(state.reference(ReferenceKind::IsoFiles).len(), 1);
    assert!(state.notifications.is_empty());
}
