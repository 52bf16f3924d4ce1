// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod download;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod store;
pub mod types;
pub mod wait;
pub mod workflows;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::api::{Credentials, HttpApi};
use crate::cli::CliArgs;
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::download::DirectoryDownloader;
use crate::engine::{
    Intent, IntentSender, LoginRequest, Runtime, RuntimeEvent, RuntimeOptions, SchedulerCore,
    TaskContext,
};
use crate::store::{MemoryStore, StateUpdate, Store};
use crate::workflows::reference::LoadPlan;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - dispatch table and scheduler runtime
/// - HTTP API client, in-memory store and console file downloader
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_config(args.config.as_ref())?;

    if args.once {
        cfg.refresh.enabled = false;
        cfg.events.enabled = false;
    }

    let table = workflows::default_table();
    table.audit()?;
    LoadPlan::standard()?;

    if args.dry_run {
        print_dry_run(&cfg, &table);
        return Ok(());
    }

    let api = Arc::new(HttpApi::from_config(&cfg.api)?);
    let store = Arc::new(MemoryStore::new());
    let download_dir = cfg
        .console
        .download_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let downloader = Arc::new(DirectoryDownloader::new(download_dir));

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let intents = IntentSender::new(rt_tx.clone());

    let ctx = TaskContext::new(api, store.clone(), intents.clone(), downloader, Arc::new(cfg));

    tokio::spawn(report_updates(store.subscribe()));

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let first = initial_intent(&args);
    info!(tag = %first.tag(), "starting session");
    intents.dispatch(first).await;

    let options = RuntimeOptions {
        exit_when_idle: args.once,
    };

    // Pure scheduling core + async IO shell around it.
    let core = SchedulerCore::new(table, options);
    let runtime = Runtime::new(core, rt_rx, ctx);
    runtime.run().await?;

    let state = store.state();
    info!(
        logged_in = state.login.logged_in,
        vms = state.vm_pages.values().map(Vec::len).sum::<usize>(),
        notifications = state.notifications.len(),
        "session finished"
    );
    Ok(())
}

fn load_config(explicit: Option<&PathBuf>) -> Result<ConfigFile> {
    if let Some(path) = explicit {
        return Ok(load_and_validate(path)?);
    }

    let path = default_config_path();
    if path.exists() {
        Ok(load_and_validate(&path)?)
    } else {
        debug!(path = %path.display(), "no config file; using defaults");
        Ok(ConfigFile::default())
    }
}

/// Token login if a token was given, password authentication if
/// credentials were, otherwise a token-less login (which fails cleanly).
fn initial_intent(args: &CliArgs) -> Intent {
    if let Some(token) = &args.token {
        return Intent::Login(LoginRequest {
            token: Some(token.clone()),
            username: args.username.clone(),
            user_id: None,
        });
    }

    match (&args.username, &args.password) {
        (Some(username), Some(password)) => Intent::Authenticate(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => Intent::Login(LoginRequest::default()),
    }
}

/// Surface the updates an operator cares about in the log.
async fn report_updates(mut updates: broadcast::Receiver<StateUpdate>) {
    loop {
        match updates.recv().await {
            Ok(StateUpdate::Failure(notification)) => {
                warn!(
                    intent = %notification.intent.tag(),
                    error = %notification.error,
                    "{}",
                    notification.summary
                );
            }
            Ok(StateUpdate::LoginFailed {
                error_code,
                message,
            }) => error!(%error_code, ?message, "login failed"),
            Ok(StateUpdate::ApiIncompatible { message, .. }) => error!("{message}"),
            Ok(StateUpdate::TokenExpired) => warn!("session token expired; log in again"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "update reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Simple dry-run output: print config and registered intents.
fn print_dry_run(cfg: &ConfigFile, table: &engine::DispatchTable) {
    println!("vmflow dry-run");
    println!("  api.base_url = {}", cfg.api.base_url);
    println!("  api.sso_url = {}", cfg.api.effective_sso_url());
    println!("  api.page_size = {}", cfg.api.page_size);
    println!("  login.required_version = {}", cfg.login.required_version);
    println!(
        "  refresh = {} (every {}s)",
        cfg.refresh.enabled, cfg.refresh.interval_secs
    );
    println!(
        "  events = {} (every {}s)",
        cfg.events.enabled, cfg.events.interval_secs
    );
    println!(
        "  polling.disk_removal = {} x {:?} ms",
        cfg.polling.disk_removal.max_iterations, cfg.polling.disk_removal.backoff_ms
    );
    println!(
        "  polling.snapshot_removal = {} x {:?} ms",
        cfg.polling.snapshot_removal.max_iterations, cfg.polling.snapshot_removal.backoff_ms
    );
    println!(
        "  polling.disk_lock = {} x {:?} ms",
        cfg.polling.disk_lock.max_iterations, cfg.polling.disk_lock.backoff_ms
    );
    println!();

    let registrations: Vec<_> = table.registrations().collect();
    println!("intents ({}):", registrations.len());
    for (tag, policy) in registrations {
        println!("  - {tag} [{policy}]");
    }

    debug!("dry-run complete (no execution)");
}
