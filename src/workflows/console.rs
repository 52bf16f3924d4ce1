// src/workflows/console.rs

//! Console acquisition: pick a console, make sure nobody else is using it,
//! then hand a connection file to the downloader.

use regex::Regex;
use tracing::{debug, info, warn};

use super::wrong_intent;
use crate::api::{Console, ConsoleProtocol, Session};
use crate::config::ConsoleSection;
use crate::download::ConsoleFile;
use crate::engine::{invoke, ConsoleRequest, Intent, IntentTag, RdpRequest, TaskContext};
use crate::store::{ConsoleStatus, StateUpdate};

pub const VV_FILE_NAME: &str = "console.vv";
pub const VV_MIME_TYPE: &str = "application/x-virt-viewer";
pub const RDP_FILE_NAME: &str = "console.rdp";
pub const RDP_MIME_TYPE: &str = "application/rdp";

pub async fn open_console(ctx: TaskContext, intent: Intent) {
    let Intent::OpenConsole(request) = &intent else {
        return wrong_intent(IntentTag::OpenConsole, &intent);
    };
    let vm_id = request.vm_id.as_str();

    let console_id = match &request.console_id {
        Some(id) => id.clone(),
        None => match resolve_console(&ctx, &intent, vm_id).await {
            Some(console) => console.id,
            None => return,
        },
    };

    if !request.skip_session_check {
        let Ok(sessions) =
            invoke(&ctx, "getVmSessions", &intent, false, ctx.api.get_vm_sessions(vm_id)).await
        else {
            return;
        };
        if console_in_use(&sessions, request.user_id.as_deref()) {
            info!(vm_id, "console is in use by another session");
            ctx.store.apply(StateUpdate::SetConsoleStatus {
                vm_id: vm_id.to_string(),
                status: ConsoleStatus::InUse,
            });
            return;
        }
    }

    let Ok(descriptor) = invoke(
        &ctx,
        "getConsoleDescriptor",
        &intent,
        false,
        ctx.api.get_console_descriptor(vm_id, &console_id),
    )
    .await
    else {
        return;
    };

    let overrides = DescriptorOverrides::from_settings(&ctx.settings.console, request);
    let file = ConsoleFile {
        file_name: VV_FILE_NAME.to_string(),
        mime_type: VV_MIME_TYPE.to_string(),
        contents: overrides.apply(&descriptor),
    };

    hand_over(&ctx, vm_id, file).await;
}

/// Fetch and publish the VM's consoles, then pick one.
async fn resolve_console(ctx: &TaskContext, intent: &Intent, vm_id: &str) -> Option<Console> {
    let consoles = invoke(ctx, "getVmConsoles", intent, false, ctx.api.get_vm_consoles(vm_id))
        .await
        .ok()?;

    let chosen = choose_console(&consoles).cloned();
    ctx.store.apply(StateUpdate::SetVmConsoles {
        vm_id: vm_id.to_string(),
        consoles,
    });

    match chosen {
        Some(console) => {
            debug!(vm_id, console_id = %console.id, protocol = ?console.protocol, "console selected");
            Some(console)
        }
        None => {
            warn!(vm_id, "vm has no consoles");
            None
        }
    }
}

/// SPICE if offered, otherwise the first console.
pub fn choose_console(consoles: &[Console]) -> Option<&Console> {
    consoles
        .iter()
        .find(|c| c.protocol == ConsoleProtocol::Spice)
        .or_else(|| consoles.first())
}

/// Whether a console-user session other than `user_id`'s holds the VM.
///
/// Without a `user_id` any console-user session counts.
pub fn console_in_use(sessions: &[Session], user_id: Option<&str>) -> bool {
    sessions.iter().any(|session| {
        session.console_user
            && match user_id {
                Some(user_id) => session.user_id.as_deref() != Some(user_id),
                None => true,
            }
    })
}

/// Presentation overrides applied to a virt-viewer descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorOverrides {
    pub fullscreen: bool,
    pub remap_secure_attention: bool,
    pub smartcard: bool,
    pub usb_filter: Option<String>,
}

impl DescriptorOverrides {
    pub fn from_settings(settings: &ConsoleSection, request: &ConsoleRequest) -> Self {
        Self {
            fullscreen: settings.fullscreen,
            remap_secure_attention: settings.remap_secure_attention,
            smartcard: settings.smartcard,
            usb_filter: request.usb_filter.clone().filter(|f| !f.is_empty()),
        }
    }

    pub fn apply(&self, descriptor: &str) -> String {
        let mut text = descriptor.to_string();

        if self.fullscreen {
            text = replace_lines(&text, r"(?m)^fullscreen=0[ \t\r]*$", "fullscreen=1");
        }
        if self.remap_secure_attention {
            text = replace_lines(
                &text,
                r"(?m)^secure-attention=[^\r\n]*",
                "secure-attention=ctrl+alt+end",
            );
        }
        if let Some(filter) = &self.usb_filter {
            let line = format!("[virt-viewer]\nusb-filter={filter}");
            text = replace_lines(&text, r"(?m)^\[virt-viewer\][ \t\r]*$", &line);
        }
        if self.smartcard && is_spice_descriptor(&text) {
            text = replace_lines(
                &text,
                r"(?m)^enable-smartcard=0[ \t\r]*$",
                "enable-smartcard=1",
            );
        }
        text
    }
}

fn is_spice_descriptor(text: &str) -> bool {
    text.lines()
        .any(|line| line.trim().eq_ignore_ascii_case("type=spice"))
}

fn replace_lines(text: &str, pattern: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re
            .replace_all(text, regex::NoExpand(replacement))
            .into_owned(),
        Err(e) => {
            warn!(pattern, error = %e, "invalid descriptor override pattern; ignoring");
            text.to_string()
        }
    }
}

pub async fn open_rdp(ctx: TaskContext, intent: Intent) {
    let Intent::OpenRdp(request) = &intent else {
        return wrong_intent(IntentTag::OpenRdp, &intent);
    };

    if request.address.trim().is_empty() {
        warn!(vm_id = %request.vm_id, "vm reports no address; cannot build an RDP file");
        return;
    }

    let file = ConsoleFile {
        file_name: RDP_FILE_NAME.to_string(),
        mime_type: RDP_MIME_TYPE.to_string(),
        contents: rdp_descriptor(request, ctx.settings.console.fullscreen),
    };
    hand_over(&ctx, &request.vm_id, file).await;
}

/// Connection file for the RDP client: fixed client options plus the
/// VM's address and the user's login.
pub fn rdp_descriptor(request: &RdpRequest, fullscreen: bool) -> String {
    let screen_mode = if fullscreen { 2 } else { 1 };
    let domain = request.domain.as_deref().unwrap_or("");
    format!(
        "screen mode id:i:{screen_mode}\n\
         desktopwidth:i:1024\n\
         desktopheight:i:768\n\
         session bpp:i:32\n\
         compression:i:1\n\
         keyboardhook:i:2\n\
         audiocapturemode:i:0\n\
         videoplaybackmode:i:1\n\
         connection type:i:2\n\
         displayconnectionbar:i:1\n\
         disable wallpaper:i:1\n\
         allow font smoothing:i:0\n\
         allow desktop composition:i:0\n\
         disable full window drag:i:1\n\
         disable menu anims:i:1\n\
         disable themes:i:0\n\
         disable cursor setting:i:0\n\
         bitmapcachepersistenable:i:1\n\
         full address:s:{address}\n\
         audiomode:i:0\n\
         redirectprinters:i:1\n\
         redirectcomports:i:0\n\
         redirectsmartcards:i:1\n\
         redirectclipboard:i:1\n\
         redirectposdevices:i:0\n\
         autoreconnection enabled:i:1\n\
         authentication level:i:0\n\
         prompt for credentials:i:0\n\
         negotiate security layer:i:1\n\
         remoteapplicationmode:i:0\n\
         gatewayusagemethod:i:4\n\
         gatewaycredentialssource:i:4\n\
         gatewayprofileusagemethod:i:0\n\
         promptcredentialonce:i:1\n\
         use redirection server name:i:0\n\
         username:s:{username}\n\
         domain:s:{domain}\n",
        address = request.address.trim(),
        username = request.username,
    )
}

async fn hand_over(ctx: &TaskContext, vm_id: &str, file: ConsoleFile) {
    let file_name = file.file_name.clone();
    match ctx.downloader.download(file).await {
        Ok(()) => {
            info!(vm_id, file = %file_name, "console file handed to the viewer");
            ctx.store.apply(StateUpdate::SetConsoleStatus {
                vm_id: vm_id.to_string(),
                status: ConsoleStatus::Opened,
            });
        }
        Err(e) => warn!(vm_id, file = %file_name, error = %e, "console file download failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "[virt-viewer]\n\
        type=spice\n\
        host=10.0.0.5\n\
        fullscreen=0\n\
        secure-attention=ctrl+alt+del\n\
        enable-smartcard=0\n\
        [ovirt]\n\
        host=engine\n";

    fn console(id: &str, protocol: ConsoleProtocol) -> Console {
        Console {
            id: id.to_string(),
            protocol,
        }
    }

    fn session(user: Option<&str>, console_user: bool) -> Session {
        Session {
            id: "s".to_string(),
            user_id: user.map(str::to_string),
            console_user,
        }
    }

    #[test]
    fn spice_is_preferred_over_earlier_consoles() {
        let consoles = vec![console("vnc", ConsoleProtocol::Vnc), console("spice", ConsoleProtocol::Spice)];
        assert_eq!(choose_console(&consoles).map(|c| c.id.as_str()), Some("spice"));

        let only_vnc = vec![console("vnc", ConsoleProtocol::Vnc)];
        assert_eq!(choose_console(&only_vnc).map(|c| c.id.as_str()), Some("vnc"));
        assert!(choose_console(&[]).is_none());
    }

    #[test]
    fn own_console_session_does_not_block() {
        let sessions = vec![session(Some("me"), true), session(Some("other"), false)];
        assert!(!console_in_use(&sessions, Some("me")));
        assert!(console_in_use(&sessions, None));
        assert!(console_in_use(&[session(Some("other"), true)], Some("me")));
        assert!(!console_in_use(&[], None));
    }

    #[test]
    fn no_overrides_leave_the_descriptor_untouched() {
        assert_eq!(DescriptorOverrides::default().apply(DESCRIPTOR), DESCRIPTOR);
    }

    #[test]
    fn overrides_rewrite_matching_lines() {
        let overrides = DescriptorOverrides {
            fullscreen: true,
            remap_secure_attention: true,
            smartcard: true,
            usb_filter: Some("-1,-1,-1,-1,1".to_string()),
        };
        let text = overrides.apply(DESCRIPTOR);

        assert!(text.starts_with("[virt-viewer]\nusb-filter=-1,-1,-1,-1,1\ntype=spice\n"));
        assert!(text.contains("\nfullscreen=1\n"));
        assert!(text.contains("\nsecure-attention=ctrl+alt+end\n"));
        assert!(text.contains("\nenable-smartcard=1\n"));
        assert!(text.ends_with("[ovirt]\nhost=engine\n"));
    }

    #[test]
    fn smartcard_is_left_alone_for_vnc() {
        let vnc = DESCRIPTOR.replace("type=spice", "type=vnc");
        let overrides = DescriptorOverrides {
            smartcard: true,
            ..Default::default()
        };
        assert!(overrides.apply(&vnc).contains("enable-smartcard=0"));
    }

    #[test]
    fn rdp_descriptor_carries_address_and_user() {
        let request = RdpRequest {
            vm_id: "vm".to_string(),
            address: " 192.168.1.20 ".to_string(),
            username: "alice".to_string(),
            domain: Some("CORP".to_string()),
        };
        let text = rdp_descriptor(&request, false);
        assert!(text.starts_with("screen mode id:i:1\n"));
        assert!(text.contains("full address:s:192.168.1.20\n"));
        assert!(text.contains("username:s:alice\n"));
        assert!(text.ends_with("domain:s:CORP\n"));
        assert!(rdp_descriptor(&request, true).starts_with("screen mode id:i:2\n"));
    }
}
