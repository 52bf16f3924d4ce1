// src/api/mod.rs

//! Remote management API as seen by the orchestration core.
//!
//! - [`RemoteApi`] is the method-call contract every workflow talks to.
//! - [`http`] provides the production implementation on top of `reqwest`.
//!
//! Resources are carried as opaque JSON values; mapping them into view models
//! is the presentation layer's job. Only the shapes that change orchestration
//! outcomes (versions, consoles, sessions, events, disk status) are typed.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::types::Version;

pub mod http;

pub use http::HttpApi;

/// Failure of a single remote call.
///
/// `status` is the HTTP status when the server answered, `Some(0)` for
/// transport/connectivity failures, and `None` when the response could not be
/// interpreted at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_transport(&self) -> bool {
        self.status == Some(0)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{status}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Outcome of an external call: the value or a normalized error.
pub type CallResult<T> = Result<T, ApiError>;

/// Boxed future returned by [`RemoteApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = CallResult<T>> + Send + 'a>>;

/// Reference data loaded in bulk after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKind {
    UserGroups,
    OperatingSystems,
    Templates,
    Hosts,
    StorageDomains,
    Clusters,
    VnicProfiles,
    IsoFiles,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 8] = [
        ReferenceKind::UserGroups,
        ReferenceKind::OperatingSystems,
        ReferenceKind::Templates,
        ReferenceKind::Hosts,
        ReferenceKind::StorageDomains,
        ReferenceKind::Clusters,
        ReferenceKind::VnicProfiles,
        ReferenceKind::IsoFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::UserGroups => "user-groups",
            ReferenceKind::OperatingSystems => "operating-systems",
            ReferenceKind::Templates => "templates",
            ReferenceKind::Hosts => "hosts",
            ReferenceKind::StorageDomains => "storage-domains",
            ReferenceKind::Clusters => "clusters",
            ReferenceKind::VnicProfiles => "vnic-profiles",
            ReferenceKind::IsoFiles => "iso-files",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressable single resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceRef {
    Vm(String),
    Host(String),
    Template(String),
    Cluster(String),
    Disk(String),
    Snapshot { vm_id: String, snapshot_id: String },
}

impl ResourceRef {
    pub fn id(&self) -> &str {
        match self {
            ResourceRef::Vm(id)
            | ResourceRef::Host(id)
            | ResourceRef::Template(id)
            | ResourceRef::Cluster(id)
            | ResourceRef::Disk(id) => id,
            ResourceRef::Snapshot { snapshot_id, .. } => snapshot_id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceRef::Vm(_) => "vm",
            ResourceRef::Host(_) => "host",
            ResourceRef::Template(_) => "template",
            ResourceRef::Cluster(_) => "cluster",
            ResourceRef::Disk(_) => "disk",
            ResourceRef::Snapshot { .. } => "snapshot",
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind_name(), self.id())
    }
}

/// Sub-collections listed per VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VmChild {
    Disks,
    Snapshots,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleProtocol {
    Spice,
    Vnc,
    Other,
}

impl ConsoleProtocol {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "spice" => ConsoleProtocol::Spice,
            "vnc" => ConsoleProtocol::Vnc,
            _ => ConsoleProtocol::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Console {
    pub id: String,
    pub protocol: ConsoleProtocol,
}

/// Active session on a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub console_user: bool,
}

/// Externally generated event. Only the referenced resource ids matter here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    pub index: u64,
    pub vm_id: Option<String>,
    pub host_id: Option<String>,
    pub template_id: Option<String>,
    pub cluster_id: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Disk attachment to create (`disk_id == None`) or edit.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSpec {
    pub disk_id: Option<String>,
    pub attachment: Value,
}

/// Method-call contract of the remote management API.
///
/// Every method resolves to a [`CallResult`]; implementations never panic on
/// remote failures. `use_token`/`use_filter` configure subsequent requests.
pub trait RemoteApi: Send + Sync {
    fn use_token(&self, token: &str);

    fn use_filter(&self, filter: bool);

    /// Exchange credentials for a bearer token.
    fn login(&self, credentials: &Credentials) -> ApiFuture<'_, String>;

    /// Raw capability metadata; the product version lives in it.
    fn get_capability_metadata(&self) -> ApiFuture<'_, Value>;

    /// Succeeds only for callers allowed to run unfiltered queries.
    fn check_filter_probe(&self) -> ApiFuture<'_, ()>;

    /// Server option value for the given compatibility version, `None` if unset.
    fn get_option(&self, name: &str, version: &Version) -> ApiFuture<'_, Option<String>>;

    fn get_reference_list(&self, kind: ReferenceKind) -> ApiFuture<'_, Vec<Value>>;

    fn get_storage_domain_files(&self, storage_domain_id: &str) -> ApiFuture<'_, Vec<Value>>;

    fn get_vms_page(&self, page: u32) -> ApiFuture<'_, Vec<Value>>;

    fn get_pools_page(&self, page: u32) -> ApiFuture<'_, Vec<Value>>;

    fn remove_resource(&self, resource: &ResourceRef) -> ApiFuture<'_, ()>;

    /// Fetch a single resource; a vanished resource is an error with status 404.
    fn get_resource(&self, resource: &ResourceRef) -> ApiFuture<'_, Value>;

    fn list_vm_children(&self, vm_id: &str, child: VmChild) -> ApiFuture<'_, Vec<Value>>;

    /// Create or update a disk attachment, returning the stored attachment.
    fn save_disk(&self, vm_id: &str, disk: &DiskSpec) -> ApiFuture<'_, Value>;

    fn get_vm_consoles(&self, vm_id: &str) -> ApiFuture<'_, Vec<Console>>;

    fn get_vm_sessions(&self, vm_id: &str) -> ApiFuture<'_, Vec<Session>>;

    /// Connection descriptor text (virt-viewer INI) for one console.
    fn get_console_descriptor(&self, vm_id: &str, console_id: &str) -> ApiFuture<'_, String>;

    /// Events newer than `since`; `None` asks for the most recent ones.
    fn get_events(&self, since: Option<u64>) -> ApiFuture<'_, Vec<Event>>;
}
