// src/api/http.rs

//! `reqwest` implementation of [`RemoteApi`] against the engine REST API.
//!
//! Collections come back wrapped in an envelope object keyed by the element
//! name (`{"vm": [...]}`); an empty collection may omit the key entirely.
//! Booleans and numbers are frequently serialized as strings, so the small
//! parsing helpers at the bottom accept both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use super::{
    ApiError, ApiFuture, CallResult, Console, ConsoleProtocol, Credentials, DiskSpec, Event,
    ReferenceKind, RemoteApi, ResourceRef, Session, VmChild,
};
use crate::config::ApiSection;
use crate::errors::{Result, VmflowError};
use crate::types::Version;

const JSON: &str = "application/json";
const VIRT_VIEWER: &str = "application/x-virt-viewer";

pub struct HttpApi {
    client: Client,
    root: String,
    sso_url: Url,
    page_size: u32,
    token: RwLock<Option<String>>,
    filter: AtomicBool,
}

impl HttpApi {
    pub fn from_config(api: &ApiSection) -> Result<Self> {
        let root = Url::parse(&api.base_url)?;
        let sso_url = Url::parse(&api.effective_sso_url())?;

        let client = Client::builder()
            .danger_accept_invalid_certs(api.accept_invalid_certs)
            .build()
            .map_err(|e| VmflowError::ConfigError(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            root: root.as_str().trim_end_matches('/').to_string(),
            sso_url,
            page_size: api.page_size,
            token: RwLock::new(None),
            filter: AtomicBool::new(true),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            self.root.clone()
        } else {
            format!("{}/{}", self.root, path.trim_start_matches('/'))
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.build(method, path, self.filter.load(Ordering::Relaxed), JSON)
    }

    fn build(&self, method: Method, path: &str, filter: bool, accept: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header(ACCEPT, accept)
            .header("Filter", filter.to_string());

        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = token.as_deref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    async fn send(&self, request: RequestBuilder) -> CallResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(fault_error(status, &body))
    }

    async fn json(&self, request: RequestBuilder) -> CallResult<Value> {
        let response = self.send(request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::malformed(format!("invalid JSON: {e}")))
    }

    async fn get_list(&self, path: &str, key: &str, query: &[(&str, String)]) -> CallResult<Vec<Value>> {
        let value = self.json(self.request(Method::GET, path).query(query)).await?;
        Ok(envelope(&value, key))
    }

    async fn get_page(&self, path: &str, key: &str, page: u32) -> CallResult<Vec<Value>> {
        let query = [
            ("search", format!("SORTBY NAME ASC page {page}")),
            ("max", self.page_size.to_string()),
        ];
        self.get_list(path, key, &query).await
    }
}

impl RemoteApi for HttpApi {
    fn use_token(&self, token: &str) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token.to_string());
    }

    fn use_filter(&self, filter: bool) {
        self.filter.store(filter, Ordering::Relaxed);
    }

    fn login(&self, credentials: &Credentials) -> ApiFuture<'_, String> {
        let form = [
            ("grant_type", "password".to_string()),
            ("scope", "ovirt-app-api".to_string()),
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
        ];
        Box::pin(async move {
            let request = self
                .client
                .post(self.sso_url.clone())
                .header(ACCEPT, JSON)
                .form(&form);
            let body = self.json(request).await?;

            if let Some(token) = body.get("access_token").and_then(Value::as_str) {
                return Ok(token.to_string());
            }
            let message = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("token endpoint returned no access token");
            Err(ApiError::new(401, message))
        })
    }

    fn get_capability_metadata(&self) -> ApiFuture<'_, Value> {
        Box::pin(async move { self.json(self.request(Method::GET, "")).await })
    }

    fn check_filter_probe(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            // Unfiltered queries are rejected for non-administrators.
            let request = self
                .build(Method::GET, "vms", false, JSON)
                .query(&[("max", "1")]);
            self.send(request).await.map(|_| ())
        })
    }

    fn get_option(&self, name: &str, version: &Version) -> ApiFuture<'_, Option<String>> {
        let path = format!("options/{name}");
        let version = version.to_string();
        Box::pin(async move {
            let request = self
                .request(Method::GET, &path)
                .query(&[("version", version.as_str())]);
            match self.json(request).await {
                Ok(body) => Ok(option_value(&body, &version)),
                Err(error) if error.is_not_found() => Ok(None),
                Err(error) => Err(error),
            }
        })
    }

    fn get_reference_list(&self, kind: ReferenceKind) -> ApiFuture<'_, Vec<Value>> {
        Box::pin(async move {
            let (path, key) = match kind {
                ReferenceKind::UserGroups => ("groups", "group"),
                ReferenceKind::OperatingSystems => ("operatingsystems", "operating_system"),
                ReferenceKind::Templates => ("templates", "template"),
                ReferenceKind::Hosts => ("hosts", "host"),
                ReferenceKind::StorageDomains => ("storagedomains", "storage_domain"),
                ReferenceKind::Clusters => ("clusters", "cluster"),
                ReferenceKind::VnicProfiles => ("vnicprofiles", "vnic_profile"),
                ReferenceKind::IsoFiles => {
                    return Err(ApiError::malformed(
                        "iso files are listed per storage domain",
                    ));
                }
            };
            self.get_list(path, key, &[]).await
        })
    }

    fn get_storage_domain_files(&self, storage_domain_id: &str) -> ApiFuture<'_, Vec<Value>> {
        let path = format!("storagedomains/{storage_domain_id}/files");
        Box::pin(async move { self.get_list(&path, "file", &[]).await })
    }

    fn get_vms_page(&self, page: u32) -> ApiFuture<'_, Vec<Value>> {
        Box::pin(async move { self.get_page("vms", "vm", page).await })
    }

    fn get_pools_page(&self, page: u32) -> ApiFuture<'_, Vec<Value>> {
        Box::pin(async move { self.get_page("vmpools", "vm_pool", page).await })
    }

    fn remove_resource(&self, resource: &ResourceRef) -> ApiFuture<'_, ()> {
        let path = resource_path(resource);
        Box::pin(async move {
            debug!(%path, "DELETE");
            self.send(self.request(Method::DELETE, &path)).await.map(|_| ())
        })
    }

    fn get_resource(&self, resource: &ResourceRef) -> ApiFuture<'_, Value> {
        let path = resource_path(resource);
        Box::pin(async move { self.json(self.request(Method::GET, &path)).await })
    }

    fn list_vm_children(&self, vm_id: &str, child: VmChild) -> ApiFuture<'_, Vec<Value>> {
        let (path, key, query) = match child {
            VmChild::Disks => (
                format!("vms/{vm_id}/diskattachments"),
                "disk_attachment",
                vec![("follow", "disk".to_string())],
            ),
            VmChild::Snapshots => (format!("vms/{vm_id}/snapshots"), "snapshot", Vec::new()),
        };
        Box::pin(async move { self.get_list(&path, key, &query).await })
    }

    fn save_disk(&self, vm_id: &str, disk: &DiskSpec) -> ApiFuture<'_, Value> {
        let (method, path) = match &disk.disk_id {
            Some(disk_id) => (Method::PUT, format!("vms/{vm_id}/diskattachments/{disk_id}")),
            None => (Method::POST, format!("vms/{vm_id}/diskattachments")),
        };
        let body = disk.attachment.clone();
        Box::pin(async move { self.json(self.request(method, &path).json(&body)).await })
    }

    fn get_vm_consoles(&self, vm_id: &str) -> ApiFuture<'_, Vec<Console>> {
        let path = format!("vms/{vm_id}/graphicsconsoles");
        Box::pin(async move {
            let items = self.get_list(&path, "graphics_console", &[]).await?;
            Ok(items.iter().filter_map(parse_console).collect())
        })
    }

    fn get_vm_sessions(&self, vm_id: &str) -> ApiFuture<'_, Vec<Session>> {
        let path = format!("vms/{vm_id}/sessions");
        Box::pin(async move {
            let items = self.get_list(&path, "session", &[]).await?;
            Ok(items.iter().filter_map(parse_session).collect())
        })
    }

    fn get_console_descriptor(&self, vm_id: &str, console_id: &str) -> ApiFuture<'_, String> {
        let path = format!("vms/{vm_id}/graphicsconsoles/{console_id}");
        Box::pin(async move {
            let filter = self.filter.load(Ordering::Relaxed);
            let request = self.build(Method::GET, &path, filter, VIRT_VIEWER);
            let response = self.send(request).await?;
            response
                .text()
                .await
                .map_err(|e| ApiError::transport(e.to_string()))
        })
    }

    fn get_events(&self, since: Option<u64>) -> ApiFuture<'_, Vec<Event>> {
        let query = match since {
            Some(index) => vec![("from", index.to_string())],
            None => vec![("max", "1".to_string())],
        };
        Box::pin(async move {
            let items = self.get_list("events", "event", &query).await?;
            trace!(count = items.len(), "fetched events");
            Ok(items.iter().filter_map(parse_event).collect())
        })
    }
}

fn resource_path(resource: &ResourceRef) -> String {
    match resource {
        ResourceRef::Vm(id) => format!("vms/{id}"),
        ResourceRef::Host(id) => format!("hosts/{id}"),
        ResourceRef::Template(id) => format!("templates/{id}"),
        ResourceRef::Cluster(id) => format!("clusters/{id}"),
        ResourceRef::Disk(id) => format!("disks/{id}"),
        ResourceRef::Snapshot { vm_id, snapshot_id } => {
            format!("vms/{vm_id}/snapshots/{snapshot_id}")
        }
    }
}

/// Engine faults look like `{"reason": "...", "detail": "..."}`.
fn fault_error(status: StatusCode, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("reason"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    ApiError::new(status.as_u16(), message)
}

fn envelope(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Prefer the value recorded for `version`, otherwise the first one present.
fn option_value(body: &Value, version: &str) -> Option<String> {
    let values = body
        .get("values")
        .and_then(|v| v.get("system_option_value"))
        .and_then(Value::as_array)?;

    let matching = values
        .iter()
        .find(|v| v.get("version").and_then(Value::as_str) == Some(version));

    matching
        .or_else(|| values.first())
        .and_then(|v| v.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn nested_id(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn lenient_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_console(value: &Value) -> Option<Console> {
    let id = value.get("id").and_then(Value::as_str)?;
    let protocol = value
        .get("protocol")
        .and_then(Value::as_str)
        .map(ConsoleProtocol::parse)
        .unwrap_or(ConsoleProtocol::Other);
    Some(Console {
        id: id.to_string(),
        protocol,
    })
}

fn parse_session(value: &Value) -> Option<Session> {
    let id = value.get("id").and_then(Value::as_str)?;
    Some(Session {
        id: id.to_string(),
        user_id: nested_id(value, "user"),
        console_user: lenient_bool(value.get("console_user")),
    })
}

fn parse_event(value: &Value) -> Option<Event> {
    let index = lenient_u64(value.get("index"))?;
    Some(Event {
        index,
        vm_id: nested_id(value, "vm"),
        host_id: nested_id(value, "host"),
        template_id: nested_id(value, "template"),
        cluster_id: nested_id(value, "cluster"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fault_error_prefers_detail_then_reason_then_body() {
        let e = fault_error(StatusCode::BAD_REQUEST, r#"{"reason":"Operation Failed","detail":"[Disk is locked]"}"#);
        assert_eq!(e, ApiError::new(400, "[Disk is locked]"));

        let e = fault_error(StatusCode::CONFLICT, r#"{"reason":"Conflict"}"#);
        assert_eq!(e.message, "Conflict");

        let e = fault_error(StatusCode::NOT_FOUND, "");
        assert_eq!(e, ApiError::new(404, "Not Found"));
    }

    #[test]
    fn missing_envelope_key_is_an_empty_list() {
        assert!(envelope(&json!({}), "vm").is_empty());
        assert_eq!(envelope(&json!({"vm": [{"id": "a"}]}), "vm").len(), 1);
    }

    #[test]
    fn option_value_picks_the_requested_version() {
        let body = json!({
            "values": { "system_option_value": [
                { "value": "false", "version": "4.1" },
                { "value": "true", "version": "4.2" }
            ]}
        });
        assert_eq!(option_value(&body, "4.2").as_deref(), Some("true"));
        assert_eq!(option_value(&body, "4.5").as_deref(), Some("false"));
        assert_eq!(option_value(&json!({}), "4.2"), None);
    }

    #[test]
    fn events_and_sessions_accept_string_encoded_fields() {
        let event = parse_event(&json!({"index": "1207", "vm": {"id": "vm-1"}})).unwrap();
        assert_eq!(event.index, 1207);
        assert_eq!(event.vm_id.as_deref(), Some("vm-1"));
        assert!(event.host_id.is_none());

        let session = parse_session(&json!({"id": "s", "console_user": "true", "user": {"id": "u"}})).unwrap();
        assert!(session.console_user);
        assert_eq!(session.user_id.as_deref(), Some("u"));
    }

    #[test]
    fn snapshot_paths_are_nested_under_the_vm() {
        let r = ResourceRef::Snapshot {
            vm_id: "v".into(),
            snapshot_id: "s".into(),
        };
        assert_eq!(resource_path(&r), "vms/v/snapshots/s");
        assert_eq!(resource_path(&ResourceRef::Disk("d".into())), "disks/d");
    }
}
