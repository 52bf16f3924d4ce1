// src/workflows/reference.rs

//! Reference data and list fetches.
//!
//! After login the reference lists are loaded along a small dependency
//! graph ([`LoadPlan`]): every list whose prerequisites have completed is
//! fetched immediately, so independent lists load concurrently. A failed
//! fetch still counts as completed; it degrades its own slice only.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::wrong_intent;
use crate::api::{ApiError, CallResult, ReferenceKind, VmChild};
use crate::engine::{invoke, Intent, IntentTag, TaskContext};
use crate::errors::{Result, VmflowError};
use crate::store::StateUpdate;

/// Prerequisites of each reference list.
pub const STANDARD_DEPENDENCIES: [(ReferenceKind, &[ReferenceKind]); 8] = [
    (ReferenceKind::UserGroups, &[]),
    (ReferenceKind::OperatingSystems, &[]),
    (ReferenceKind::Templates, &[]),
    (ReferenceKind::Hosts, &[]),
    (ReferenceKind::StorageDomains, &[]),
    (ReferenceKind::Clusters, &[ReferenceKind::UserGroups]),
    (ReferenceKind::VnicProfiles, &[ReferenceKind::UserGroups]),
    (ReferenceKind::IsoFiles, &[ReferenceKind::StorageDomains]),
];

/// Validated, acyclic order in which reference lists may be loaded.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    order: Vec<ReferenceKind>,
    prerequisites: BTreeMap<ReferenceKind, Vec<ReferenceKind>>,
}

impl LoadPlan {
    /// Build a plan from `(kind, prerequisites)` pairs.
    ///
    /// Edge direction is prerequisite -> kind; a cycle is rejected.
    pub fn new(dependencies: &[(ReferenceKind, &[ReferenceKind])]) -> Result<Self> {
        let mut graph: DiGraphMap<ReferenceKind, ()> = DiGraphMap::new();
        let mut prerequisites = BTreeMap::new();

        for (kind, deps) in dependencies {
            graph.add_node(*kind);
            for dep in deps.iter() {
                graph.add_edge(*dep, *kind, ());
            }
            prerequisites.insert(*kind, deps.to_vec());
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(Self {
                order,
                prerequisites,
            }),
            Err(cycle) => Err(VmflowError::CyclicLoadPlan(format!(
                "cycle involving '{}'",
                cycle.node_id()
            ))),
        }
    }

    pub fn standard() -> Result<Self> {
        Self::new(&STANDARD_DEPENDENCIES)
    }

    /// Topological order (prerequisites first).
    pub fn order(&self) -> &[ReferenceKind] {
        &self.order
    }

    pub fn prerequisites(&self, kind: ReferenceKind) -> &[ReferenceKind] {
        self.prerequisites
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Kinds not yet started whose prerequisites are all in `completed`.
    pub fn ready(
        &self,
        started: &BTreeSet<ReferenceKind>,
        completed: &BTreeSet<ReferenceKind>,
    ) -> Vec<ReferenceKind> {
        self.order
            .iter()
            .copied()
            .filter(|kind| !started.contains(kind))
            .filter(|kind| self.prerequisites(*kind).iter().all(|d| completed.contains(d)))
            .collect()
    }

    /// Load every list with maximal concurrency.
    ///
    /// `then` is dispatched as soon as every fetch has been started; it does
    /// not wait for the slowest list. Cancelling the caller drops the
    /// `JoinSet`, which aborts the fetches still in flight.
    pub async fn run(&self, ctx: &TaskContext, then: Option<Intent>) {
        let mut started = BTreeSet::new();
        let mut completed = BTreeSet::new();
        let mut running = JoinSet::new();
        let mut then = then;

        loop {
            for kind in self.ready(&started, &completed) {
                started.insert(kind);
                let ctx = ctx.clone();
                running.spawn(async move {
                    fetch_reference_list(&ctx, kind).await;
                    kind
                });
            }

            if started.len() == self.order.len() {
                if let Some(intent) = then.take() {
                    debug!(tag = %intent.tag(), "every reference fetch issued");
                    ctx.dispatch(intent).await;
                }
            }

            match running.join_next().await {
                Some(Ok(kind)) => {
                    completed.insert(kind);
                }
                Some(Err(e)) => {
                    // Dependents of the failed fetch never become ready.
                    error!(error = %e, "reference load task aborted");
                }
                None => break,
            }
        }

        if let Some(intent) = then {
            ctx.dispatch(intent).await;
        }

        debug!(
            loaded = completed.len(),
            planned = self.order.len(),
            "reference load finished"
        );
    }
}

/// Bulk reference load; the first VM/pool page is issued once every
/// reference fetch is under way.
pub async fn load_all(ctx: &TaskContext) {
    let first_page = Intent::FetchVmsPage { page: 1 };
    match LoadPlan::standard() {
        Ok(plan) => plan.run(ctx, Some(first_page)).await,
        Err(e) => {
            error!(error = %e, "invalid reference load plan; skipping reference data");
            ctx.dispatch(first_page).await;
        }
    }
}

/// Fetch one reference list and publish it. Returns whether it loaded.
pub async fn fetch_reference_list(ctx: &TaskContext, kind: ReferenceKind) -> bool {
    let origin = Intent::FetchReferenceList(kind);
    let result = match kind {
        ReferenceKind::IsoFiles => fetch_iso_files(ctx, &origin).await,
        _ => {
            invoke(
                ctx,
                "getReferenceList",
                &origin,
                false,
                ctx.api.get_reference_list(kind),
            )
            .await
        }
    };

    match result {
        Ok(items) => {
            info!(%kind, count = items.len(), "reference list loaded");
            ctx.store.apply(StateUpdate::SetReferenceList { kind, items });
            true
        }
        Err(_) => false,
    }
}

/// ISO images live in the files of ISO-type storage domains, so this reads
/// the storage domains already in the store.
///
/// Fails, leaving any stored ISO list alone, when the storage domains never
/// loaded or when every ISO domain failed to answer.
async fn fetch_iso_files(ctx: &TaskContext, origin: &Intent) -> CallResult<Vec<Value>> {
    let state = ctx.store.state();
    let Some(storage_domains) = state.references.get(&ReferenceKind::StorageDomains) else {
        warn!("storage domains not loaded; keeping iso files");
        return Err(ApiError::malformed("storage domains are not loaded"));
    };
    let domains: Vec<String> = storage_domains
        .iter()
        .filter(|domain| domain.get("type").and_then(Value::as_str) == Some("iso"))
        .filter_map(|domain| domain.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    drop(state);

    let mut files = Vec::new();
    let mut answered = 0;
    let mut last_error = None;
    for domain in &domains {
        match invoke(
            ctx,
            "getStorageDomainFiles",
            origin,
            false,
            ctx.api.get_storage_domain_files(domain),
        )
        .await
        {
            Ok(items) => {
                answered += 1;
                files.extend(items);
            }
            Err(e) => last_error = Some(e),
        }
    }
    debug!(domains = domains.len(), answered, files = files.len(), "iso files collected");

    match last_error {
        Some(e) if answered == 0 => Err(e),
        _ => Ok(files),
    }
}

pub async fn fetch_reference_list_task(ctx: TaskContext, intent: Intent) {
    let Intent::FetchReferenceList(kind) = &intent else {
        return wrong_intent(IntentTag::FetchReferenceList, &intent);
    };
    fetch_reference_list(&ctx, *kind).await;
}

async fn load_page(ctx: &TaskContext, origin: &Intent, page: u32) {
    let (vms, pools) = tokio::join!(
        invoke(ctx, "getVmsPage", origin, false, ctx.api.get_vms_page(page)),
        invoke(ctx, "getPoolsPage", origin, false, ctx.api.get_pools_page(page)),
    );

    if let Ok(vms) = vms {
        debug!(page, count = vms.len(), "vms page loaded");
        ctx.store.apply(StateUpdate::SetVmsPage { page, vms });
    }
    if let Ok(pools) = pools {
        debug!(page, count = pools.len(), "pools page loaded");
        ctx.store.apply(StateUpdate::SetPoolsPage { page, pools });
    }
}

pub async fn fetch_vms_page(ctx: TaskContext, intent: Intent) {
    let Intent::FetchVmsPage { page } = &intent else {
        return wrong_intent(IntentTag::FetchVmsPage, &intent);
    };
    load_page(&ctx, &intent, *page).await;
}

/// Re-fetch every page loaded so far (at least the first).
pub async fn refresh_vms(ctx: TaskContext, intent: Intent) {
    let pages = ctx.store.state().loaded_vm_pages().max(1);
    debug!(pages, "refreshing vm pages");
    for page in 1..=pages {
        load_page(&ctx, &intent, page).await;
    }
}

/// Re-fetch one resource; a 404 means it is gone.
pub async fn refresh_resource(ctx: TaskContext, intent: Intent) {
    let Intent::RefreshResource(resource) = &intent else {
        return wrong_intent(IntentTag::RefreshResource, &intent);
    };

    // Background refreshes do not feed the notification list.
    match invoke(&ctx, "getResource", &intent, true, ctx.api.get_resource(resource)).await {
        Ok(value) => ctx.store.apply(StateUpdate::SetResource {
            resource: resource.clone(),
            value,
        }),
        Err(error) if error.is_not_found() => {
            debug!(%resource, "resource no longer exists");
            ctx.store.apply(StateUpdate::ResourceRemoved(resource.clone()));
        }
        Err(error) => warn!(%resource, %error, "resource refresh failed"),
    }
}

async fn fetch_vm_children(ctx: &TaskContext, intent: &Intent, vm_id: &str, child: VmChild) {
    if let Ok(items) = invoke(
        ctx,
        "listVmChildren",
        intent,
        false,
        ctx.api.list_vm_children(vm_id, child),
    )
    .await
    {
        debug!(vm_id, ?child, count = items.len(), "vm children loaded");
        ctx.store.apply(StateUpdate::SetVmChildren {
            vm_id: vm_id.to_string(),
            child,
            items,
        });
    }
}

pub async fn fetch_vm_disks(ctx: TaskContext, intent: Intent) {
    let Intent::FetchVmDisks { vm_id } = &intent else {
        return wrong_intent(IntentTag::FetchVmDisks, &intent);
    };
    fetch_vm_children(&ctx, &intent, vm_id, VmChild::Disks).await;
}

pub async fn fetch_vm_snapshots(ctx: TaskContext, intent: Intent) {
    let Intent::FetchVmSnapshots { vm_id } = &intent else {
        return wrong_intent(IntentTag::FetchVmSnapshots, &intent);
    };
    fetch_vm_children(&ctx, &intent, vm_id, VmChild::Snapshots).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(plan: &LoadPlan, kind: ReferenceKind) -> usize {
        plan.order().iter().position(|k| *k == kind).unwrap()
    }

    #[test]
    fn standard_plan_orders_prerequisites_first() {
        let plan = LoadPlan::standard().unwrap();
        assert_eq!(plan.order().len(), ReferenceKind::ALL.len());
        assert!(position(&plan, ReferenceKind::UserGroups) < position(&plan, ReferenceKind::Clusters));
        assert!(
            position(&plan, ReferenceKind::UserGroups) < position(&plan, ReferenceKind::VnicProfiles)
        );
        assert!(
            position(&plan, ReferenceKind::StorageDomains) < position(&plan, ReferenceKind::IsoFiles)
        );
    }

    #[test]
    fn ready_releases_dependents_after_completion() {
        let plan = LoadPlan::standard().unwrap();
        let none = BTreeSet::new();

        let first = plan.ready(&none, &none);
        assert!(first.contains(&ReferenceKind::UserGroups));
        assert!(first.contains(&ReferenceKind::Hosts));
        assert!(!first.contains(&ReferenceKind::Clusters));
        assert!(!first.contains(&ReferenceKind::IsoFiles));

        let started: BTreeSet<_> = first.iter().copied().collect();
        let completed: BTreeSet<_> = [ReferenceKind::UserGroups].into_iter().collect();
        let next = plan.ready(&started, &completed);
        assert_eq!(next.len(), 2);
        assert!(next.contains(&ReferenceKind::Clusters));
        assert!(next.contains(&ReferenceKind::VnicProfiles));
        assert!(!next.contains(&ReferenceKind::IsoFiles));
    }

    #[test]
    fn cyclic_plan_is_rejected() {
        let deps: [(ReferenceKind, &[ReferenceKind]); 2] = [
            (ReferenceKind::Hosts, &[ReferenceKind::Clusters]),
            (ReferenceKind::Clusters, &[ReferenceKind::Hosts]),
        ];
        let err = LoadPlan::new(&deps).unwrap_err();
        assert!(matches!(err, VmflowError::CyclicLoadPlan(_)));
    }
}
