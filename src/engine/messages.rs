// src/engine/messages.rs

//! Short, human-readable summaries for failed external calls.

use crate::api::ApiError;
use crate::engine::IntentTag;

/// Summary used for transport failures, where the server said nothing.
pub const CONNECTION_FAILED: &str = "Connection to the engine failed";

/// Tag-specific summary, `None` for tags that use the generic fallback.
pub fn short_message(tag: IntentTag) -> Option<&'static str> {
    match tag {
        IntentTag::Authenticate => Some("Authentication failed"),
        IntentTag::Login => Some("Login failed"),
        IntentTag::FetchReferenceList => Some("Failed to load reference data"),
        IntentTag::FetchVmsPage | IntentTag::RefreshVms => Some("Failed to load virtual machines"),
        IntentTag::RefreshResource => Some("Failed to refresh resource"),
        IntentTag::FetchVmDisks => Some("Failed to load virtual machine disks"),
        IntentTag::FetchVmSnapshots => Some("Failed to load virtual machine snapshots"),
        IntentTag::RemoveDisk => Some("Failed to remove disk"),
        IntentTag::RemoveSnapshot => Some("Failed to remove snapshot"),
        IntentTag::SaveDisk => Some("Failed to save disk"),
        IntentTag::OpenConsole => Some("Failed to open console"),
        IntentTag::StartEventPolling => Some("Failed to load events"),
        IntentTag::OpenRdp | IntentTag::StartSchedulerFixedDelay => None,
    }
}

/// Summary shown in the failure feed: connection failures first, then the
/// tag table, then `"<tag> failed"`.
pub fn summary_for(tag: IntentTag, error: &ApiError) -> String {
    if error.is_transport() {
        return CONNECTION_FAILED.to_string();
    }
    short_message(tag)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{tag} failed"))
}
