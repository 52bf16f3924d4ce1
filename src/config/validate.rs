// src/config/validate.rs

use url::Url;

use crate::config::model::{ConfigFile, PollPolicySection, RawConfigFile};
use crate::errors::{Result, VmflowError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = VmflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_api(cfg)?;
    validate_polling(cfg)?;
    validate_intervals(cfg)?;
    Ok(())
}

fn validate_api(cfg: &RawConfigFile) -> Result<()> {
    let base = Url::parse(&cfg.api.base_url)?;
    if base.cannot_be_a_base() {
        return Err(VmflowError::ConfigError(format!(
            "[api].base_url '{}' cannot be used as a base URL",
            cfg.api.base_url
        )));
    }
    Url::parse(&cfg.api.effective_sso_url())?;

    if cfg.api.page_size == 0 {
        return Err(VmflowError::ConfigError(
            "[api].page_size must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_polling(cfg: &RawConfigFile) -> Result<()> {
    if cfg.polling.wait_max_iterations == 0 {
        return Err(VmflowError::ConfigError(
            "[polling].wait_max_iterations must be >= 1 (got 0)".to_string(),
        ));
    }

    validate_poll_policy("polling.disk_removal", &cfg.polling.disk_removal)?;
    validate_poll_policy("polling.snapshot_removal", &cfg.polling.snapshot_removal)?;
    validate_poll_policy("polling.disk_lock", &cfg.polling.disk_lock)?;
    Ok(())
}

fn validate_poll_policy(section: &str, policy: &PollPolicySection) -> Result<()> {
    if policy.max_iterations == 0 {
        return Err(VmflowError::ConfigError(format!(
            "[{section}].max_iterations must be >= 1 (got 0)"
        )));
    }
    if policy.backoff_ms.is_empty() {
        return Err(VmflowError::ConfigError(format!(
            "[{section}].backoff_ms must contain at least one delay"
        )));
    }
    Ok(())
}

fn validate_intervals(cfg: &RawConfigFile) -> Result<()> {
    if cfg.refresh.enabled && cfg.refresh.interval_secs == 0 {
        return Err(VmflowError::ConfigError(
            "[refresh].interval_secs must be >= 1 when refresh is enabled".to_string(),
        ));
    }
    if cfg.events.enabled && cfg.events.interval_secs == 0 {
        return Err(VmflowError::ConfigError(
            "[events].interval_secs must be >= 1 when event polling is enabled".to_string(),
        ));
    }
    Ok(())
}
