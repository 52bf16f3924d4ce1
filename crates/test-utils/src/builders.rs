#![allow(dead_code)]

use vmflow::config::{ConfigFile, PollPolicySection, RawConfigFile};
use vmflow::types::Version;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with both background loops disabled, so a
/// login under test ends after the bulk load.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.refresh.enabled = false;
        config.events.enabled = false;
        Self { config }
    }

    pub fn with_refresh(mut self, interval_secs: u64) -> Self {
        self.config.refresh.enabled = true;
        self.config.refresh.interval_secs = interval_secs;
        self
    }

    pub fn with_events(mut self, interval_secs: u64) -> Self {
        self.config.events.enabled = true;
        self.config.events.interval_secs = interval_secs;
        self
    }

    pub fn with_required_version(mut self, major: u32, minor: u32) -> Self {
        self.config.login.required_version = Version::new(major, minor);
        self
    }

    pub fn with_disk_removal(mut self, max_iterations: usize, backoff_ms: &[u64]) -> Self {
        self.config.polling.disk_removal = policy(max_iterations, backoff_ms);
        self
    }

    pub fn with_snapshot_removal(mut self, max_iterations: usize, backoff_ms: &[u64]) -> Self {
        self.config.polling.snapshot_removal = policy(max_iterations, backoff_ms);
        self
    }

    pub fn with_disk_lock(mut self, max_iterations: usize, backoff_ms: &[u64]) -> Self {
        self.config.polling.disk_lock = policy(max_iterations, backoff_ms);
        self
    }

    pub fn with_console(mut self, fullscreen: bool, remap_secure_attention: bool, smartcard: bool) -> Self {
        self.config.console.fullscreen = fullscreen;
        self.config.console.remap_secure_attention = remap_secure_attention;
        self.config.console.smartcard = smartcard;
        self
    }

    pub fn with_max_sockets(mut self, max_sockets: u32) -> Self {
        self.config.options.max_sockets = max_sockets;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn policy(max_iterations: usize, backoff_ms: &[u64]) -> PollPolicySection {
    PollPolicySection {
        max_iterations,
        backoff_ms: backoff_ms.to_vec(),
    }
}
