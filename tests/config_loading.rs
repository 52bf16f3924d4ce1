// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use vmflow::config::{load_and_validate, ConfigFile, RawConfigFile};
use vmflow::errors::VmflowError;
use vmflow::types::Version;
use vmflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Vmflow.toml");
    fs::write(&path, contents).expect("write config");
    path
}

fn rejected(contents: &str) -> VmflowError {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(&dir, contents);
    match load_and_validate(&path) {
        Ok(cfg) => panic!("expected a validation error, got {cfg:?}"),
        Err(e) => e,
    }
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let cfg = load_and_validate(write_config(&dir, ""))?;

    assert_eq!(cfg.api.base_url, "https://localhost/ovirt-engine/api");
    assert_eq!(
        cfg.api.effective_sso_url(),
        "https://localhost/ovirt-engine/sso/oauth/token"
    );
    assert_eq!(cfg.api.page_size, 50);
    assert_eq!(cfg.login.required_version, Version::new(4, 2));
    assert!(cfg.refresh.enabled);
    assert!(cfg.events.enabled);

    let removal = cfg.polling.disk_removal.policy();
    assert_eq!(removal.max_iterations(), 5);
    assert_eq!(removal.delay_after(0), Duration::from_secs(4));
    assert_eq!(removal.delay_after(3), Duration::from_secs(60));
    assert_eq!(cfg.polling.disk_lock.max_iterations, 15);
    Ok(())
}

#[test]
fn sections_override_their_defaults_only() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let cfg = load_and_validate(write_config(
        &dir,
        r#"
[api]
base_url = "https://engine.example.com/ovirt-engine/api/"
page_size = 100

[login]
required_version = { major = 4, minor = 4 }

[polling.snapshot_removal]
max_iterations = 3
backoff_ms = [1000]

[refresh]
interval_secs = 30

[events]
enabled = false

[options]
max_sockets = 32

[console]
fullscreen = true
download_dir = "/tmp/consoles"
"#,
    ))?;

    assert_eq!(
        cfg.api.effective_sso_url(),
        "https://engine.example.com/ovirt-engine/sso/oauth/token"
    );
    assert_eq!(cfg.api.page_size, 100);
    assert_eq!(cfg.login.required_version, Version::new(4, 4));
    assert_eq!(cfg.polling.snapshot_removal.max_iterations, 3);
    assert_eq!(cfg.polling.disk_removal.max_iterations, 5, "sibling policy keeps its default");
    assert_eq!(cfg.refresh.interval(), Duration::from_secs(30));
    assert!(!cfg.events.enabled);
    assert_eq!(cfg.options.max_sockets, 32);
    assert_eq!(cfg.options.max_vcpus, 384);
    assert!(cfg.console.fullscreen);
    assert!(!cfg.console.smartcard);
    Ok(())
}

#[test]
fn explicit_sso_url_wins() -> TestResult {
    let dir = TempDir::new()?;
    let cfg = load_and_validate(write_config(
        &dir,
        r#"
[api]
base_url = "https://engine/ovirt-engine/api"
sso_url = "https://sso.example.com/token"
"#,
    ))?;
    assert_eq!(cfg.api.effective_sso_url(), "https://sso.example.com/token");
    Ok(())
}

#[test]
fn unparseable_base_url_is_rejected() {
    init_tracing();
    let err = rejected("[api]\nbase_url = \"not a url\"\n");
    assert!(matches!(err, VmflowError::InvalidUrl(_)), "got {err:?}");
}

#[test]
fn empty_backoff_schedule_is_rejected() {
    let err = rejected("[polling.disk_lock]\nmax_iterations = 3\nbackoff_ms = []\n");
    match err {
        VmflowError::ConfigError(message) => assert!(message.contains("polling.disk_lock")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_iterations_are_rejected() {
    let err = rejected("[polling.disk_removal]\nmax_iterations = 0\nbackoff_ms = [100]\n");
    assert!(matches!(err, VmflowError::ConfigError(_)), "got {err:?}");
}

#[test]
fn zero_interval_is_only_rejected_when_enabled() -> TestResult {
    let err = rejected("[refresh]\ninterval_secs = 0\n");
    assert!(matches!(err, VmflowError::ConfigError(_)), "got {err:?}");

    let mut raw = RawConfigFile::default();
    raw.refresh.enabled = false;
    raw.refresh.interval_secs = 0;
    ConfigFile::try_from(raw)?;
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = rejected("[api\nbase_url = 1");
    assert!(matches!(err, VmflowError::TomlError(_)), "got {err:?}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, VmflowError::IoError(_)), "got {err:?}");
}
