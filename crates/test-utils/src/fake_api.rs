use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use vmflow::api::{
    ApiError, ApiFuture, CallResult, Console, Credentials, DiskSpec, Event, ReferenceKind,
    RemoteApi, ResourceRef, Session, VmChild,
};
use vmflow::types::Version;

/// Scripted in-memory [`RemoteApi`].
///
/// - Every call is appended to a log as `"method arg"` strings.
/// - Unscripted calls succeed with empty data; unscripted resources are 404.
/// - Scripted resource responses are consumed in order and the last one
///   repeats. Event batches are consumed once each.
/// - Each call yields once before answering, like a real request would.
///   Reference lists can be slowed down further per kind.
pub struct FakeApi {
    inner: Mutex<Script>,
}

struct Script {
    calls: Vec<String>,
    token: Option<String>,
    filter: Option<bool>,
    login: CallResult<String>,
    metadata: CallResult<Value>,
    filter_probe: CallResult<()>,
    options: HashMap<String, CallResult<Option<String>>>,
    references: HashMap<ReferenceKind, CallResult<Vec<Value>>>,
    reference_delays: HashMap<ReferenceKind, Duration>,
    storage_domain_files: HashMap<String, CallResult<Vec<Value>>>,
    vms_pages: HashMap<u32, Vec<Value>>,
    pools_pages: HashMap<u32, Vec<Value>>,
    remove: CallResult<()>,
    resources: HashMap<ResourceRef, VecDeque<CallResult<Value>>>,
    children: HashMap<(String, VmChild), Vec<Value>>,
    save_disk: CallResult<Value>,
    consoles: HashMap<String, Vec<Console>>,
    sessions: HashMap<String, Vec<Session>>,
    descriptor: CallResult<String>,
    events: VecDeque<CallResult<Vec<Event>>>,
}

/// Capability metadata reporting `major.minor`.
pub fn metadata(major: u32, minor: u32) -> Value {
    json!({ "product_info": { "version": { "major": major, "minor": minor } } })
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Script {
                calls: Vec::new(),
                token: None,
                filter: None,
                login: Ok("token-from-login".to_string()),
                metadata: Ok(metadata(4, 3)),
                filter_probe: Ok(()),
                options: HashMap::new(),
                references: HashMap::new(),
                reference_delays: HashMap::new(),
                storage_domain_files: HashMap::new(),
                vms_pages: HashMap::new(),
                pools_pages: HashMap::new(),
                remove: Ok(()),
                resources: HashMap::new(),
                children: HashMap::new(),
                save_disk: Ok(json!({})),
                consoles: HashMap::new(),
                sessions: HashMap::new(),
                descriptor: Ok(String::new()),
                events: VecDeque::new(),
            }),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.lock().unwrap()
    }

    /// Log `call` and compute the response under the lock.
    fn answer<T, F>(&self, call: String, respond: F) -> ApiFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Script) -> CallResult<T>,
    {
        self.answer_after(call, Duration::ZERO, respond)
    }

    /// Like [`FakeApi::answer`], but the response arrives `delay` later.
    fn answer_after<T, F>(&self, call: String, delay: Duration, respond: F) -> ApiFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Script) -> CallResult<T>,
    {
        let result = {
            let mut script = self.script();
            script.calls.push(call);
            respond(&mut script)
        };
        Box::pin(async move {
            tokio::task::yield_now().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    // ---- inspection ----

    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    /// Number of logged calls whose method name is `method`.
    pub fn count(&self, method: &str) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(method))
            .count()
    }

    pub fn token(&self) -> Option<String> {
        self.script().token.clone()
    }

    pub fn filter(&self) -> Option<bool> {
        self.script().filter
    }

    // ---- scripting ----

    pub fn set_login(&self, result: CallResult<String>) {
        self.script().login = result;
    }

    pub fn set_metadata(&self, result: CallResult<Value>) {
        self.script().metadata = result;
    }

    pub fn set_filter_probe(&self, result: CallResult<()>) {
        self.script().filter_probe = result;
    }

    pub fn set_option(&self, name: &str, result: CallResult<Option<String>>) {
        self.script().options.insert(name.to_string(), result);
    }

    pub fn set_reference(&self, kind: ReferenceKind, result: CallResult<Vec<Value>>) {
        self.script().references.insert(kind, result);
    }

    /// Delay every `get_reference_list(kind)` answer by `delay`.
    pub fn set_reference_delay(&self, kind: ReferenceKind, delay: Duration) {
        self.script().reference_delays.insert(kind, delay);
    }

    pub fn set_storage_domain_files(&self, domain: &str, files: CallResult<Vec<Value>>) {
        self.script()
            .storage_domain_files
            .insert(domain.to_string(), files);
    }

    pub fn set_vms_page(&self, page: u32, vms: Vec<Value>) {
        self.script().vms_pages.insert(page, vms);
    }

    pub fn set_remove(&self, result: CallResult<()>) {
        self.script().remove = result;
    }

    /// Queue responses for `get_resource(resource)`.
    pub fn push_resource(&self, resource: ResourceRef, result: CallResult<Value>) {
        self.script()
            .resources
            .entry(resource)
            .or_default()
            .push_back(result);
    }

    pub fn set_children(&self, vm_id: &str, child: VmChild, items: Vec<Value>) {
        self.script()
            .children
            .insert((vm_id.to_string(), child), items);
    }

    pub fn set_save_disk(&self, result: CallResult<Value>) {
        self.script().save_disk = result;
    }

    pub fn set_consoles(&self, vm_id: &str, consoles: Vec<Console>) {
        self.script().consoles.insert(vm_id.to_string(), consoles);
    }

    pub fn set_sessions(&self, vm_id: &str, sessions: Vec<Session>) {
        self.script().sessions.insert(vm_id.to_string(), sessions);
    }

    pub fn set_descriptor(&self, result: CallResult<String>) {
        self.script().descriptor = result;
    }

    /// Queue a response for `get_events`.
    pub fn push_events(&self, result: CallResult<Vec<Event>>) {
        self.script().events.push_back(result);
    }
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl RemoteApi for FakeApi {
    fn use_token(&self, token: &str) {
        self.script().token = Some(token.to_string());
    }

    fn use_filter(&self, filter: bool) {
        self.script().filter = Some(filter);
    }

    fn login(&self, credentials: &Credentials) -> ApiFuture<'_, String> {
        self.answer(format!("login {}", credentials.username), |s| s.login.clone())
    }

    fn get_capability_metadata(&self) -> ApiFuture<'_, Value> {
        self.answer("get_capability_metadata".to_string(), |s| s.metadata.clone())
    }

    fn check_filter_probe(&self) -> ApiFuture<'_, ()> {
        self.answer("check_filter_probe".to_string(), |s| s.filter_probe.clone())
    }

    fn get_option(&self, name: &str, version: &Version) -> ApiFuture<'_, Option<String>> {
        let key = name.to_string();
        self.answer(format!("get_option {name} {version}"), move |s| {
            s.options.get(&key).cloned().unwrap_or(Ok(None))
        })
    }

    fn get_reference_list(&self, kind: ReferenceKind) -> ApiFuture<'_, Vec<Value>> {
        let delay = self
            .script()
            .reference_delays
            .get(&kind)
            .copied()
            .unwrap_or_default();
        self.answer_after(format!("get_reference_list {kind}"), delay, move |s| {
            s.references.get(&kind).cloned().unwrap_or(Ok(Vec::new()))
        })
    }

    fn get_storage_domain_files(&self, storage_domain_id: &str) -> ApiFuture<'_, Vec<Value>> {
        let key = storage_domain_id.to_string();
        self.answer(
            format!("get_storage_domain_files {storage_domain_id}"),
            move |s| {
                s.storage_domain_files
                    .get(&key)
                    .cloned()
                    .unwrap_or(Ok(Vec::new()))
            },
        )
    }

    fn get_vms_page(&self, page: u32) -> ApiFuture<'_, Vec<Value>> {
        self.answer(format!("get_vms_page {page}"), move |s| {
            Ok(s.vms_pages.get(&page).cloned().unwrap_or_default())
        })
    }

    fn get_pools_page(&self, page: u32) -> ApiFuture<'_, Vec<Value>> {
        self.answer(format!("get_pools_page {page}"), move |s| {
            Ok(s.pools_pages.get(&page).cloned().unwrap_or_default())
        })
    }

    fn remove_resource(&self, resource: &ResourceRef) -> ApiFuture<'_, ()> {
        self.answer(format!("remove_resource {resource}"), |s| s.remove.clone())
    }

    fn get_resource(&self, resource: &ResourceRef) -> ApiFuture<'_, Value> {
        let key = resource.clone();
        self.answer(format!("get_resource {resource}"), move |s| {
            s.resources
                .get_mut(&key)
                .and_then(next_scripted)
                .unwrap_or_else(|| Err(ApiError::new(404, format!("{key} not found"))))
        })
    }

    fn list_vm_children(&self, vm_id: &str, child: VmChild) -> ApiFuture<'_, Vec<Value>> {
        let key = (vm_id.to_string(), child);
        self.answer(format!("list_vm_children {vm_id} {child:?}"), move |s| {
            Ok(s.children.get(&key).cloned().unwrap_or_default())
        })
    }

    fn save_disk(&self, vm_id: &str, disk: &DiskSpec) -> ApiFuture<'_, Value> {
        let target = disk.disk_id.as_deref().unwrap_or("new");
        self.answer(format!("save_disk {vm_id} {target}"), |s| s.save_disk.clone())
    }

    fn get_vm_consoles(&self, vm_id: &str) -> ApiFuture<'_, Vec<Console>> {
        let key = vm_id.to_string();
        self.answer(format!("get_vm_consoles {vm_id}"), move |s| {
            Ok(s.consoles.get(&key).cloned().unwrap_or_default())
        })
    }

    fn get_vm_sessions(&self, vm_id: &str) -> ApiFuture<'_, Vec<Session>> {
        let key = vm_id.to_string();
        self.answer(format!("get_vm_sessions {vm_id}"), move |s| {
            Ok(s.sessions.get(&key).cloned().unwrap_or_default())
        })
    }

    fn get_console_descriptor(&self, vm_id: &str, console_id: &str) -> ApiFuture<'_, String> {
        self.answer(
            format!("get_console_descriptor {vm_id} {console_id}"),
            |s| s.descriptor.clone(),
        )
    }

    fn get_events(&self, since: Option<u64>) -> ApiFuture<'_, Vec<Event>> {
        let since = since.map_or_else(|| "-".to_string(), |i| i.to_string());
        self.answer(format!("get_events {since}"), |s| {
            s.events.pop_front().unwrap_or(Ok(Vec::new()))
        })
    }
}
