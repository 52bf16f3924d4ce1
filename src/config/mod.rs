// src/config/mod.rs

//! Configuration loading and validation for vmflow.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: semantic checks (URLs, poll policies, intervals).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ApiSection, ConfigFile, ConsoleSection, EventsSection, LoginSection, OptionsSection,
    PollPolicySection, PollingSection, RawConfigFile, RefreshSection,
};
