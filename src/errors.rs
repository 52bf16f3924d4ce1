// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Failures of remote calls are *not* represented here: they travel as
//! [`crate::api::ApiError`] values through the invoker and never abort a task.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Intents without a registered handler: {0}")]
    UnregisteredIntents(String),

    #[error("Cycle detected in reference load plan: {0}")]
    CyclicLoadPlan(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, VmflowError>;
