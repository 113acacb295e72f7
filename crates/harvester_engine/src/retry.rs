use std::fmt;
use std::future::Future;
use std::time::Duration;

use engine_logging::engine_warn;
use rand::Rng as _;
use tokio_util::sync::CancellationToken;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Fixed attempt budget with a uniformly jittered pause in `[min_delay, max_delay)`
/// so that concurrent workers do not retry in lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transport()
    }
}

impl RetryPolicy {
    /// Transport-level budget: 5 attempts, 4-9s apart.
    pub fn transport() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(9),
        }
    }

    /// Page-level budget for decode and status failures: 3 attempts, 4-9s apart.
    pub fn page() -> Self {
        Self {
            max_attempts: 3,
            ..Self::transport()
        }
    }

    /// Identity-provider budget for each of refresh and login.
    pub fn auth() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the final error.
    Exhausted { attempts: u32, last: E },
    /// The classifier refused to retry this error.
    Aborted(E),
    /// The cancellation token fired while attempting or waiting.
    Cancelled,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            RetryError::Aborted(err) => write!(f, "{err}"),
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Run `operation` until it succeeds, the classifier aborts, the budget runs
/// out, or `cancel` fires. The operation receives the 1-based attempt number.
///
/// Cancellation drops the in-flight attempt.
pub async fn retry_with_policy<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    classifier: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: fmt::Display,
{
    let total_attempts = policy.attempts();

    for attempt in 1..=total_attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation(attempt) => result,
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if classifier(&err) == RetryAction::Abort {
            return Err(RetryError::Aborted(err));
        }
        if attempt == total_attempts {
            return Err(RetryError::Exhausted {
                attempts: total_attempts,
                last: err,
            });
        }

        let delay = policy.delay();
        engine_warn!(
            "{} failed (attempt {}/{}), retrying in {:?}: {}",
            label,
            attempt,
            total_attempts,
            delay,
            err
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    unreachable!("retry loop returns on its last attempt")
}
