// src/wait/poll.rs

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, trace};

/// Iteration budget plus backoff schedule for [`poll_until`].
///
/// `backoff[i]` is slept after the `i`-th unsatisfied attempt; once the
/// schedule runs out its last delay repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    max_iterations: usize,
    backoff: Vec<Duration>,
}

impl PollPolicy {
    pub fn new(max_iterations: usize, backoff: Vec<Duration>) -> Self {
        Self {
            max_iterations,
            backoff,
        }
    }

    /// Same delay between every attempt.
    pub fn fixed(max_iterations: usize, delay: Duration) -> Self {
        Self::new(max_iterations, vec![delay])
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.backoff
            .get(attempt)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Result of [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The predicate held for `value` on attempt number `attempts`.
    Satisfied { value: T, attempts: usize },
    /// Budget spent; `last` is the final observed result.
    Exhausted { last: Option<T>, attempts: usize },
}

impl<T> PollOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            PollOutcome::Satisfied { attempts, .. } | PollOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Repeatedly `fetch` until `predicate` accepts a result.
///
/// - Every result, satisfying or not, is handed to `on_result` first so
///   observers see live status during the wait.
/// - No sleep happens before the first attempt nor after the last one.
/// - Exactly `policy.max_iterations()` fetches are made when the predicate
///   never holds.
pub async fn poll_until<T, F, Fut, P, O>(
    policy: &PollPolicy,
    mut fetch: F,
    mut predicate: P,
    mut on_result: O,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: FnMut(&T) -> bool,
    O: FnMut(&T),
{
    let max = policy.max_iterations();
    let mut last = None;

    for attempt in 0..max {
        let result = fetch().await;
        on_result(&result);

        if predicate(&result) {
            debug!(attempt = attempt + 1, "poll predicate satisfied");
            return PollOutcome::Satisfied {
                value: result,
                attempts: attempt + 1,
            };
        }

        if attempt + 1 < max {
            let delay = policy.delay_after(attempt);
            trace!(attempt = attempt + 1, ?delay, "poll predicate not satisfied; backing off");
            sleep(delay).await;
        }
        last = Some(result);
    }

    debug!(attempts = max, "poll budget exhausted");
    PollOutcome::Exhausted {
        last,
        attempts: max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_repeats_last_entry() {
        let policy = PollPolicy::new(
            6,
            vec![Duration::from_secs(4), Duration::from_secs(4), Duration::from_secs(60)],
        );
        assert_eq!(policy.delay_after(0), Duration::from_secs(4));
        assert_eq!(policy.delay_after(2), Duration::from_secs(60));
        assert_eq!(policy.delay_after(5), Duration::from_secs(60));
    }

    #[test]
    fn empty_schedule_means_no_delay() {
        let policy = PollPolicy::new(3, Vec::new());
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }
}
