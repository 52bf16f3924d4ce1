// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated `RawConfigFile`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), "parsed config file");

    Ok(config)
}

/// Load a configuration file and validate it.
///
/// Missing sections fall back to their defaults; validation rejects
/// unparseable URLs, empty backoff schedules and zero intervals.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Vmflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Vmflow.toml")
}
