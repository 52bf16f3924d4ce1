// src/wait/equal.rs

use std::time::Duration;

use tokio::time::sleep;
use tracing::trace;

/// Compare `left()` and `right()` every `interval` until they agree.
///
/// Either side may be a live read (e.g. a store selector) or a constant
/// captured in a closure. Returns `false` after `max_iterations` unequal
/// comparisons; `max_iterations == 0` never compares and returns `false`.
pub async fn wait_until_equal<T, L, R>(
    left: L,
    right: R,
    max_iterations: usize,
    interval: Duration,
) -> bool
where
    T: PartialEq,
    L: Fn() -> T,
    R: Fn() -> T,
{
    for attempt in 0..max_iterations {
        if left() == right() {
            return true;
        }
        if attempt + 1 < max_iterations {
            trace!(attempt = attempt + 1, "values differ; waiting");
            sleep(interval).await;
        }
    }
    false
}
