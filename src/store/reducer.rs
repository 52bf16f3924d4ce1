// src/store/reducer.rs

//! Pure reduction of [`StateUpdate`]s into [`AppState`].

use tracing::warn;

use super::{AppState, StateUpdate};

pub fn reduce(state: &mut AppState, update: &StateUpdate) {
    match update {
        StateUpdate::LoginSuccessful {
            token,
            username,
            user_id,
        } => {
            state.login.token = Some(token.clone());
            state.login.username = username.clone();
            state.login.user_id = user_id.clone();
            state.login.logged_in = true;
            state.login.error_code = None;
            state.login.token_expired = false;
        }
        StateUpdate::LoginFailed { error_code, .. } => {
            state.login.logged_in = false;
            state.login.error_code = Some(error_code.clone());
        }
        StateUpdate::TokenExpired => state.login.token_expired = true,
        StateUpdate::ApiVersion(version) => state.api_version = Some(*version),
        StateUpdate::ApiIncompatible { message, .. } => {
            state.api_incompatible = Some(message.clone());
        }
        StateUpdate::Failure(notification) => state.notifications.push(notification.clone()),
        StateUpdate::SetAdministrator(admin) => state.administrator = *admin,
        StateUpdate::SetFilter(filter) => state.filter = *filter,
        StateUpdate::SetCpuTopologyOptions(options) => state.cpu_options = Some(*options),
        StateUpdate::SetReferenceList { kind, items } => {
            state.references.insert(*kind, items.clone());
        }
        StateUpdate::SetVmsPage { page, vms } => {
            state.vm_pages.insert(*page, vms.clone());
        }
        StateUpdate::SetPoolsPage { page, pools } => {
            state.pool_pages.insert(*page, pools.clone());
        }
        StateUpdate::SetResource { resource, value } => {
            state.resources.insert(resource.clone(), value.clone());
        }
        StateUpdate::ResourceRemoved(resource) => {
            state.resources.remove(resource);
        }
        StateUpdate::SetVmChildren {
            vm_id,
            child,
            items,
        } => {
            state
                .vm_children
                .insert((vm_id.clone(), *child), items.clone());
        }
        StateUpdate::AddPendingTask(task) => {
            if !state.pending_tasks.insert(task.clone()) {
                warn!(?task, "pending task already recorded");
            }
        }
        StateUpdate::RemovePendingTask(task) => {
            if !state.pending_tasks.remove(task) {
                warn!(?task, "removing pending task that was not recorded");
            }
        }
        StateUpdate::SetVmConsoles { vm_id, consoles } => {
            state.consoles.insert(vm_id.clone(), consoles.clone());
        }
        StateUpdate::SetConsoleStatus { vm_id, status } => {
            state.console_status.insert(vm_id.clone(), *status);
        }
        StateUpdate::DiskFormError { vm_id, message } => {
            state.disk_form_errors.insert(vm_id.clone(), message.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PendingKind, PendingTask};

    #[test]
    fn pending_tasks_are_unique_per_kind_and_id() {
        let mut state = AppState::default();
        let task = PendingTask::new(PendingKind::DiskRemoval, "d1");

        reduce(&mut state, &StateUpdate::AddPendingTask(task.clone()));
        reduce(&mut state, &StateUpdate::AddPendingTask(task.clone()));
        assert_eq!(state.pending_tasks.len(), 1);

        let other_kind = PendingTask::new(PendingKind::SnapshotRemoval, "d1");
        reduce(&mut state, &StateUpdate::AddPendingTask(other_kind));
        assert_eq!(state.pending_tasks.len(), 2);

        reduce(&mut state, &StateUpdate::RemovePendingTask(task.clone()));
        assert!(!state.is_pending(&task));
    }

    #[test]
    fn loaded_pages_tracks_highest_page() {
        let mut state = AppState::default();
        assert_eq!(state.loaded_vm_pages(), 0);
        reduce(&mut state, &StateUpdate::SetVmsPage { page: 2, vms: vec![] });
        reduce(&mut state, &StateUpdate::SetVmsPage { page: 1, vms: vec![] });
        assert_eq!(state.loaded_vm_pages(), 2);
    }
}
