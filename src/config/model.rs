// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::Version;
use crate::wait::PollPolicy;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [api]
/// base_url = "https://engine.example.com/ovirt-engine/api"
///
/// [login]
/// required_version = { major = 4, minor = 2 }
///
/// [polling.disk_removal]
/// max_iterations = 5
/// backoff_ms = [4000, 4000, 4000, 60000]
///
/// [console]
/// fullscreen = true
/// ```
///
/// Every section is optional and has defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub login: LoginSection,

    #[serde(default)]
    pub polling: PollingSection,

    #[serde(default)]
    pub refresh: RefreshSection,

    #[serde(default)]
    pub events: EventsSection,

    #[serde(default)]
    pub options: OptionsSection,

    #[serde(default)]
    pub console: ConsoleSection,
}

/// Validated configuration. Construct via `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub api: ApiSection,
    pub login: LoginSection,
    pub polling: PollingSection,
    pub refresh: RefreshSection,
    pub events: EventsSection,
    pub options: OptionsSection,
    pub console: ConsoleSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            api: raw.api,
            login: raw.login,
            polling: raw.polling,
            refresh: raw.refresh,
            events: raw.events,
            options: raw.options,
            console: raw.console,
        }
    }
}

impl Default for ConfigFile {
    /// All defaults are valid, so no validation pass is needed here.
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[api]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    /// Root of the REST API, e.g. `https://engine/ovirt-engine/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token endpoint; derived from `base_url` when absent.
    #[serde(default)]
    pub sso_url: Option<String>,

    /// Number of VMs/pools requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_base_url() -> String {
    "https://localhost/ovirt-engine/api".to_string()
}

fn default_page_size() -> u32 {
    50
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sso_url: None,
            page_size: default_page_size(),
            accept_invalid_certs: false,
        }
    }
}

impl ApiSection {
    /// `sso_url` if set, otherwise `<engine>/sso/oauth/token` next to the API root.
    pub fn effective_sso_url(&self) -> String {
        if let Some(ref url) = self.sso_url {
            return url.clone();
        }
        let root = self.base_url.trim_end_matches('/');
        let engine = root.strip_suffix("/api").unwrap_or(root);
        format!("{engine}/sso/oauth/token")
    }
}

/// `[login]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginSection {
    /// Oldest engine API version this client works with.
    #[serde(default = "default_required_version")]
    pub required_version: Version,
}

fn default_required_version() -> Version {
    Version::new(4, 2)
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            required_version: default_required_version(),
        }
    }
}

/// Poll policy as written in TOML (milliseconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PollPolicySection {
    pub max_iterations: usize,
    pub backoff_ms: Vec<u64>,
}

impl PollPolicySection {
    fn new(max_iterations: usize, backoff_ms: &[u64]) -> Self {
        Self {
            max_iterations,
            backoff_ms: backoff_ms.to_vec(),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(
            self.max_iterations,
            self.backoff_ms.iter().copied().map(Duration::from_millis).collect(),
        )
    }
}

/// `[polling]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingSection {
    /// Interval between `wait_until_equal` comparisons.
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,

    #[serde(default = "default_wait_max_iterations")]
    pub wait_max_iterations: usize,

    #[serde(default = "default_removal_policy")]
    pub disk_removal: PollPolicySection,

    #[serde(default = "default_removal_policy")]
    pub snapshot_removal: PollPolicySection,

    /// Waiting for a created/edited disk to leave the `locked` state.
    #[serde(default = "default_disk_lock_policy")]
    pub disk_lock: PollPolicySection,
}

fn default_wait_interval_ms() -> u64 {
    20
}

fn default_wait_max_iterations() -> usize {
    50
}

fn default_removal_policy() -> PollPolicySection {
    PollPolicySection::new(5, &[4_000, 4_000, 4_000, 60_000])
}

fn default_disk_lock_policy() -> PollPolicySection {
    PollPolicySection::new(15, &[2_000])
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            wait_interval_ms: default_wait_interval_ms(),
            wait_max_iterations: default_wait_max_iterations(),
            disk_removal: default_removal_policy(),
            snapshot_removal: default_removal_policy(),
            disk_lock: default_disk_lock_policy(),
        }
    }
}

impl PollingSection {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

/// `[refresh]` section: fixed-delay re-fetch of the loaded VM pages.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval_secs() -> u64 {
    60
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl RefreshSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// `[events]` section: the event refresh loop.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_events_interval_secs")]
    pub interval_secs: u64,
}

fn default_events_interval_secs() -> u64 {
    5
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_events_interval_secs(),
        }
    }
}

impl EventsSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// `[options]` section: fallbacks for server options missing on the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionsSection {
    #[serde(default = "default_max_sockets")]
    pub max_sockets: u32,

    #[serde(default = "default_max_cores_per_socket")]
    pub max_cores_per_socket: u32,

    #[serde(default = "default_max_threads_per_core")]
    pub max_threads_per_core: u32,

    #[serde(default = "default_max_vcpus")]
    pub max_vcpus: u32,
}

fn default_max_sockets() -> u32 {
    16
}

fn default_max_cores_per_socket() -> u32 {
    254
}

fn default_max_threads_per_core() -> u32 {
    8
}

fn default_max_vcpus() -> u32 {
    384
}

impl Default for OptionsSection {
    fn default() -> Self {
        Self {
            max_sockets: default_max_sockets(),
            max_cores_per_socket: default_max_cores_per_socket(),
            max_threads_per_core: default_max_threads_per_core(),
            max_vcpus: default_max_vcpus(),
        }
    }
}

/// `[console]` section: overrides applied to downloaded console descriptors.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConsoleSection {
    #[serde(default)]
    pub fullscreen: bool,

    /// Map the secure-attention sequence to Ctrl+Alt+End instead of Ctrl+Alt+Del.
    #[serde(default)]
    pub remap_secure_attention: bool,

    /// Enable SmartCard passthrough for SPICE consoles.
    #[serde(default)]
    pub smartcard: bool,

    /// Directory console files are written to; current directory when unset.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}
