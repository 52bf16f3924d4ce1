// src/workflows/login.rs

//! Login & capability workflow.
//!
//! Strictly sequential: a later step never starts before the earlier one has
//! finished. Any failing gate (missing token, incompatible API) stops the
//! chain, so no data is loaded against an engine this client cannot talk to.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{reference, wrong_intent};
use crate::engine::{invoke, Intent, IntentTag, LoginRequest, TaskContext};
use crate::store::{CpuTopologyOptions, StateUpdate};
use crate::types::Version;
use crate::wait::wait_until_equal;

/// Error code published when login is attempted without a token.
pub const NO_ACCESS: &str = "no_access";
pub const AUTHENTICATION_FAILED: &str = "authentication_failed";

/// Engine option forcing filtered queries in the web UI.
pub const FILTER_OPTION: &str = "AlwaysFilterResultsForWebUi";

pub const MAX_SOCKETS_OPTION: &str = "MaxNumOfVmSockets";
pub const MAX_CORES_PER_SOCKET_OPTION: &str = "MaxNumOfCpuPerSocket";
pub const MAX_THREADS_PER_CORE_OPTION: &str = "MaxNumOfThreadsPerCpu";
pub const MAX_VCPUS_OPTION: &str = "MaxNumOfVmCpus";

/// Exchange credentials for a token, then continue with [`login`].
pub async fn authenticate(ctx: TaskContext, intent: Intent) {
    let Intent::Authenticate(credentials) = &intent else {
        return wrong_intent(IntentTag::Authenticate, &intent);
    };

    info!(username = %credentials.username, "authenticating");
    match invoke(&ctx, "login", &intent, false, ctx.api.login(credentials)).await {
        Ok(token) => {
            ctx.dispatch(Intent::Login(LoginRequest {
                token: Some(token),
                username: Some(credentials.username.clone()),
                user_id: None,
            }))
            .await;
        }
        Err(error) => {
            ctx.store.apply(StateUpdate::LoginFailed {
                error_code: AUTHENTICATION_FAILED.to_string(),
                message: Some(error.message),
            });
        }
    }
}

pub async fn login(ctx: TaskContext, intent: Intent) {
    let Intent::Login(request) = &intent else {
        return wrong_intent(IntentTag::Login, &intent);
    };

    let Some(token) = request.token.as_deref().filter(|t| !t.is_empty()) else {
        info!("no access token; login failed");
        ctx.store.apply(StateUpdate::LoginFailed {
            error_code: NO_ACCESS.to_string(),
            message: None,
        });
        return;
    };

    ctx.api.use_token(token);
    ctx.store.apply(StateUpdate::LoginSuccessful {
        token: token.to_string(),
        username: request.username.clone(),
        user_id: request.user_id.clone(),
    });
    info!(username = ?request.username, "login successful");

    let Some(version) = check_api_version(&ctx, &intent).await else {
        return;
    };

    let filter = resolve_filter(&ctx, &intent, &version).await;
    ctx.api.use_filter(filter);

    let options = load_cpu_topology_options(&ctx, &intent, &version).await;
    ctx.store.apply(StateUpdate::SetCpuTopologyOptions(options));

    reference::load_all(&ctx).await;

    if ctx.settings.refresh.enabled {
        ctx.dispatch(Intent::StartSchedulerFixedDelay).await;
    }
    if ctx.settings.events.enabled {
        ctx.dispatch(Intent::StartEventPolling).await;
    }
    info!("login workflow complete");
}

/// Backward-compatible version rule; see [`Version::satisfies`].
pub fn compare_version(actual: &Version, required: &Version) -> bool {
    actual.satisfies(required)
}

/// Read `product_info.version.{major,minor}` from capability metadata.
///
/// The engine reports the numbers either as JSON numbers or as strings.
pub fn parse_product_version(metadata: &Value) -> Option<Version> {
    let version = metadata.get("product_info")?.get("version")?;
    let major = version_number(version.get("major")?)?;
    let minor = version_number(version.get("minor")?)?;
    Some(Version::new(major, minor))
}

fn version_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn check_api_version(ctx: &TaskContext, intent: &Intent) -> Option<Version> {
    let required = ctx.settings.login.required_version;
    let metadata = invoke(
        ctx,
        "getCapabilityMetadata",
        intent,
        false,
        ctx.api.get_capability_metadata(),
    )
    .await
    .ok()?;

    match parse_product_version(&metadata) {
        Some(actual) if compare_version(&actual, &required) => {
            info!(%actual, %required, "engine API version compatible");
            ctx.store.apply(StateUpdate::ApiVersion(actual));
            Some(actual)
        }
        actual => {
            let message = match actual {
                Some(actual) => {
                    format!("engine API version {actual} is older than the required {required}")
                }
                None => "engine did not report a usable API version".to_string(),
            };
            error!(%required, ?actual, "{message}");
            ctx.store.apply(StateUpdate::ApiIncompatible {
                required,
                actual,
                message,
            });
            None
        }
    }
}

/// Decide whether queries run filtered and wait until the store agrees.
async fn resolve_filter(ctx: &TaskContext, intent: &Intent, version: &Version) -> bool {
    let administrator = invoke(ctx, "checkFilter", intent, true, ctx.api.check_filter_probe())
        .await
        .is_ok();
    ctx.store.apply(StateUpdate::SetAdministrator(administrator));

    if !administrator {
        info!("user is not an administrator; results are always filtered");
        ctx.store.apply(StateUpdate::SetFilter(true));
        return true;
    }

    let wanted = fetch_option(ctx, intent, FILTER_OPTION, version)
        .await
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    ctx.store.apply(StateUpdate::SetFilter(wanted));

    let store = Arc::clone(&ctx.store);
    let polling = &ctx.settings.polling;
    let converged = wait_until_equal(
        move || store.state().filter,
        move || wanted,
        polling.wait_max_iterations,
        polling.wait_interval(),
    )
    .await;

    if converged {
        debug!(filter = wanted, "filter flag settled");
        wanted
    } else {
        warn!(filter = wanted, "filter flag did not settle; forcing filtered results");
        ctx.store.apply(StateUpdate::SetFilter(true));
        true
    }
}

/// Option value, or `None` when unset or unreadable. Missing options are
/// expected on older engines and are not reported.
async fn fetch_option(
    ctx: &TaskContext,
    intent: &Intent,
    name: &str,
    version: &Version,
) -> Option<String> {
    invoke(ctx, "getOption", intent, true, ctx.api.get_option(name, version))
        .await
        .ok()
        .flatten()
}

async fn numeric_option(
    ctx: &TaskContext,
    intent: &Intent,
    name: &str,
    version: &Version,
    fallback: u32,
) -> u32 {
    match fetch_option(ctx, intent, name, version).await {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(option = name, %value, fallback, "non-numeric option value; using fallback");
            fallback
        }),
        None => fallback,
    }
}

async fn load_cpu_topology_options(
    ctx: &TaskContext,
    intent: &Intent,
    version: &Version,
) -> CpuTopologyOptions {
    let defaults = &ctx.settings.options;
    let (max_sockets, max_cores_per_socket, max_threads_per_core, max_vcpus) = tokio::join!(
        numeric_option(ctx, intent, MAX_SOCKETS_OPTION, version, defaults.max_sockets),
        numeric_option(
            ctx,
            intent,
            MAX_CORES_PER_SOCKET_OPTION,
            version,
            defaults.max_cores_per_socket
        ),
        numeric_option(
            ctx,
            intent,
            MAX_THREADS_PER_CORE_OPTION,
            version,
            defaults.max_threads_per_core
        ),
        numeric_option(ctx, intent, MAX_VCPUS_OPTION, version, defaults.max_vcpus),
    );

    let options = CpuTopologyOptions {
        max_sockets,
        max_cores_per_socket,
        max_threads_per_core,
        max_vcpus,
    };
    debug!(?options, "cpu topology options loaded");
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_version_accepts_numbers_and_strings() {
        let numbers = json!({"product_info": {"version": {"major": 4, "minor": 3}}});
        assert_eq!(parse_product_version(&numbers), Some(Version::new(4, 3)));

        let strings = json!({"product_info": {"version": {"major": "4", "minor": "2"}}});
        assert_eq!(parse_product_version(&strings), Some(Version::new(4, 2)));
    }

    #[test]
    fn product_version_missing_fields_is_none() {
        assert_eq!(parse_product_version(&json!({})), None);
        let partial = json!({"product_info": {"version": {"major": 4}}});
        assert_eq!(parse_product_version(&partial), None);
        let garbage = json!({"product_info": {"version": {"major": "four", "minor": 1}}});
        assert_eq!(parse_product_version(&garbage), None);
    }

    #[test]
    fn compare_version_follows_major_then_minor() {
        let required = Version::new(4, 2);
        assert!(compare_version(&Version::new(4, 2), &required));
        assert!(compare_version(&Version::new(4, 5), &required));
        assert!(compare_version(&Version::new(5, 0), &required));
        assert!(!compare_version(&Version::new(4, 1), &required));
        assert!(!compare_version(&Version::new(3, 9), &required));
    }
}
