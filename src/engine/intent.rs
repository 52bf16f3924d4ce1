// src/engine/intent.rs

//! Intents: tagged requests for the orchestration layer.

use std::fmt;

use crate::api::{Credentials, DiskSpec, ReferenceKind, ResourceRef};

/// Payload of [`Intent::Login`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginRequest {
    pub token: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
}

/// Payload of [`Intent::OpenConsole`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsoleRequest {
    pub vm_id: String,
    /// Resolved from the VM's consoles when absent.
    pub console_id: Option<String>,
    pub usb_filter: Option<String>,
    /// Sessions of this user do not count as "console in use".
    pub user_id: Option<String>,
    /// Set after the operator confirmed taking over a busy console.
    pub skip_session_check: bool,
}

/// Payload of [`Intent::OpenRdp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdpRequest {
    pub vm_id: String,
    pub address: String,
    pub username: String,
    pub domain: Option<String>,
}

/// A unit of work requested from the orchestration layer.
///
/// Immutable once dispatched; the variant selects the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Authenticate(Credentials),
    Login(LoginRequest),
    FetchReferenceList(ReferenceKind),
    FetchVmsPage {
        page: u32,
    },
    /// Re-fetch every VM page loaded so far.
    RefreshVms,
    RefreshResource(ResourceRef),
    FetchVmDisks {
        vm_id: String,
    },
    FetchVmSnapshots {
        vm_id: String,
    },
    RemoveDisk {
        disk_id: String,
        /// VM whose disk list is refreshed once removal is confirmed.
        vm_id: Option<String>,
    },
    RemoveSnapshot {
        vm_id: String,
        snapshot_id: String,
    },
    SaveDisk {
        vm_id: String,
        disk: DiskSpec,
    },
    OpenConsole(ConsoleRequest),
    OpenRdp(RdpRequest),
    StartSchedulerFixedDelay,
    StartEventPolling,
}

impl Intent {
    pub fn tag(&self) -> IntentTag {
        match self {
            Intent::Authenticate(_) => IntentTag::Authenticate,
            Intent::Login(_) => IntentTag::Login,
            Intent::FetchReferenceList(_) => IntentTag::FetchReferenceList,
            Intent::FetchVmsPage { .. } => IntentTag::FetchVmsPage,
            Intent::RefreshVms => IntentTag::RefreshVms,
            Intent::RefreshResource(_) => IntentTag::RefreshResource,
            Intent::FetchVmDisks { .. } => IntentTag::FetchVmDisks,
            Intent::FetchVmSnapshots { .. } => IntentTag::FetchVmSnapshots,
            Intent::RemoveDisk { .. } => IntentTag::RemoveDisk,
            Intent::RemoveSnapshot { .. } => IntentTag::RemoveSnapshot,
            Intent::SaveDisk { .. } => IntentTag::SaveDisk,
            Intent::OpenConsole(_) => IntentTag::OpenConsole,
            Intent::OpenRdp(_) => IntentTag::OpenRdp,
            Intent::StartSchedulerFixedDelay => IntentTag::StartSchedulerFixedDelay,
            Intent::StartEventPolling => IntentTag::StartEventPolling,
        }
    }
}

/// Closed set of intent tags; the dispatch table is keyed by these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntentTag {
    Authenticate,
    Login,
    FetchReferenceList,
    FetchVmsPage,
    RefreshVms,
    RefreshResource,
    FetchVmDisks,
    FetchVmSnapshots,
    RemoveDisk,
    RemoveSnapshot,
    SaveDisk,
    OpenConsole,
    OpenRdp,
    StartSchedulerFixedDelay,
    StartEventPolling,
}

impl IntentTag {
    pub const ALL: [IntentTag; 15] = [
        IntentTag::Authenticate,
        IntentTag::Login,
        IntentTag::FetchReferenceList,
        IntentTag::FetchVmsPage,
        IntentTag::RefreshVms,
        IntentTag::RefreshResource,
        IntentTag::FetchVmDisks,
        IntentTag::FetchVmSnapshots,
        IntentTag::RemoveDisk,
        IntentTag::RemoveSnapshot,
        IntentTag::SaveDisk,
        IntentTag::OpenConsole,
        IntentTag::OpenRdp,
        IntentTag::StartSchedulerFixedDelay,
        IntentTag::StartEventPolling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentTag::Authenticate => "authenticate",
            IntentTag::Login => "login",
            IntentTag::FetchReferenceList => "fetch-reference-list",
            IntentTag::FetchVmsPage => "fetch-vms-page",
            IntentTag::RefreshVms => "refresh-vms",
            IntentTag::RefreshResource => "refresh-resource",
            IntentTag::FetchVmDisks => "fetch-vm-disks",
            IntentTag::FetchVmSnapshots => "fetch-vm-snapshots",
            IntentTag::RemoveDisk => "remove-disk",
            IntentTag::RemoveSnapshot => "remove-snapshot",
            IntentTag::SaveDisk => "save-disk",
            IntentTag::OpenConsole => "open-console",
            IntentTag::OpenRdp => "open-rdp",
            IntentTag::StartSchedulerFixedDelay => "start-scheduler-fixed-delay",
            IntentTag::StartEventPolling => "start-event-polling",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
