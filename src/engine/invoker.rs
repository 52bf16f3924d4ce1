// src/engine/invoker.rs

//! External call invoker: the single place remote failures are normalized
//! and reported.

use std::future::Future;

use tracing::{debug, trace, warn};

use crate::api::CallResult;
use crate::engine::messages::summary_for;
use crate::engine::{Intent, TaskContext};
use crate::store::{FailureNotification, StateUpdate};

/// Await `call` on behalf of `origin` and report its failure.
///
/// - 401 publishes [`StateUpdate::TokenExpired`] (once per failed call; the
///   call is not retried).
/// - Unless `allow_missing`, exactly one [`FailureNotification`] is
///   published, summarised from the origin's tag.
/// - The error is always returned to the caller, never re-raised.
pub async fn invoke<T, Fut>(
    ctx: &TaskContext,
    name: &str,
    origin: &Intent,
    allow_missing: bool,
    call: Fut,
) -> CallResult<T>
where
    Fut: Future<Output = CallResult<T>>,
{
    let error = match call.await {
        Ok(value) => {
            trace!(call = name, "external call succeeded");
            return Ok(value);
        }
        Err(error) => error,
    };

    if error.is_unauthorized() {
        warn!(call = name, "authentication token expired");
        ctx.store.apply(StateUpdate::TokenExpired);
    }

    if allow_missing {
        debug!(
            call = name,
            status = ?error.status,
            error = %error.message,
            "external call failed; caller tolerates the failure"
        );
    } else {
        let tag = origin.tag();
        warn!(
            call = name,
            %tag,
            status = ?error.status,
            error = %error.message,
            "external call failed"
        );
        ctx.store.apply(StateUpdate::Failure(FailureNotification {
            summary: summary_for(tag, &error),
            error: error.clone(),
            intent: origin.clone(),
        }));
    }

    Err(error)
}
