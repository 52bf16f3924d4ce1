// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `vmflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vmflow",
    version,
    about = "Drive VM management workflows (login, data load, refresh) against an engine.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Vmflow.toml` in the current working directory, or built-in
    /// defaults if that file does not exist.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Access token from an earlier login.
    #[arg(long, env = "VMFLOW_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// User name for password authentication (used when no token is given).
    #[arg(long, value_name = "USER")]
    pub username: Option<String>,

    #[arg(long, env = "VMFLOW_PASSWORD", value_name = "PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `VMFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log in, load the data once, and exit without background refreshes.
    #[arg(long)]
    pub once: bool,

    /// Validate the config, print it and the dispatch table, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
