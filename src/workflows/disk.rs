// src/workflows/disk.rs

//! Disk create/edit.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::wrong_intent;
use crate::api::{CallResult, ResourceRef};
use crate::engine::{invoke, Intent, IntentTag, TaskContext};
use crate::store::StateUpdate;
use crate::wait::poll_until;

/// Save a disk attachment, wait for the disk to unlock, refresh the VM's
/// disk list.
///
/// A rejected save goes to the originating form as
/// [`StateUpdate::DiskFormError`] instead of the notification list.
pub async fn save_disk(ctx: TaskContext, intent: Intent) {
    let Intent::SaveDisk { vm_id, disk } = &intent else {
        return wrong_intent(IntentTag::SaveDisk, &intent);
    };

    let saved = match invoke(&ctx, "saveDisk", &intent, true, ctx.api.save_disk(vm_id, disk)).await
    {
        Ok(saved) => saved,
        Err(error) => {
            warn!(vm_id = %vm_id, %error, "disk save rejected");
            ctx.store.apply(StateUpdate::DiskFormError {
                vm_id: vm_id.clone(),
                message: error.message,
            });
            return;
        }
    };

    let refresh = Intent::FetchVmDisks {
        vm_id: vm_id.clone(),
    };

    let Some(disk_id) = disk.disk_id.clone().or_else(|| saved_disk_id(&saved)) else {
        warn!(vm_id = %vm_id, "saved attachment carries no disk id; skipping unlock wait");
        ctx.dispatch(refresh).await;
        return;
    };

    let resource = ResourceRef::Disk(disk_id);
    let policy = ctx.settings.polling.disk_lock.policy();

    // A freshly created disk may not be readable yet, so fetch failures are
    // tolerated here.
    let outcome = poll_until(
        &policy,
        || invoke(&ctx, "getResource", &intent, true, ctx.api.get_resource(&resource)),
        |result: &CallResult<Value>| matches!(result, Ok(disk) if disk_unlocked(disk)),
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

    if outcome.is_satisfied() {
        info!(%resource, attempts = outcome.attempts(), "disk saved and unlocked");
    } else {
        warn!(%resource, attempts = outcome.attempts(), "disk still locked after polling");
    }
    ctx.dispatch(refresh).await;
}

/// `status` present and anything but `locked`.
pub fn disk_unlocked(disk: &Value) -> bool {
    match disk.get("status").and_then(Value::as_str) {
        Some(status) => !status.eq_ignore_ascii_case("locked"),
        None => {
            debug!("disk has no status yet");
            false
        }
    }
}

/// The engine returns the attachment; its disk id sits under `disk.id`,
/// with the attachment id as fallback (they coincide).
fn saved_disk_id(attachment: &Value) -> Option<String> {
    attachment
        .get("disk")
        .and_then(|disk| disk.get("id"))
        .or_else(|| attachment.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unlocked_requires_a_status_other_than_locked() {
        assert!(disk_unlocked(&json!({"status": "ok"})));
        assert!(!disk_unlocked(&json!({"status": "locked"})));
        assert!(!disk_unlocked(&json!({"status": "LOCKED"})));
        assert!(!disk_unlocked(&json!({})));
    }

    #[test]
    fn disk_id_prefers_nested_disk() {
        assert_eq!(
            saved_disk_id(&json!({"id": "a", "disk": {"id": "d"}})).as_deref(),
            Some("d")
        );
        assert_eq!(saved_disk_id(&json!({"id": "a"})).as_deref(), Some("a"));
        assert_eq!(saved_disk_id(&json!({})), None);
    }
}
