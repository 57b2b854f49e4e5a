use std::fmt::Debug;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use backoff::SystemClock;
use tracing::debug;
use tracing::warn;

/// Bounded attempts with exponential back-off between them.
///
/// With the default 2s initial delay and multiplier 2 the sleeps are
/// 2s, 4s, 8s, ... capped at `max_delay`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier: 2.0,
            max_delay: initial_delay.saturating_mul(32),
        }
    }

    /// Retries without sleeping. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBackoff<SystemClock> {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Debug + Display> {
    #[error("{operation} gave up after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: E,
    },

    #[error("{operation} failed with a non-retryable error: {error}")]
    Aborted { operation: String, error: E },
}

impl<E: Debug + Display> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or `policy.max_attempts` attempts have been made. `op` receives the
/// 1-based attempt number.
pub async fn retry_with_backoff<T, E, Op, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: Op,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    E: Debug + Display,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(value);
            }
            Err(error) if !is_retryable(&error) => {
                warn!("{} failed on attempt {}: {}", operation, attempt, error);
                return Err(RetryError::Aborted {
                    operation: operation.to_owned(),
                    error,
                });
            }
            Err(error) => {
                if attempt >= max_attempts {
                    warn!("Max number of attempts ({}) exceeded for {}: {}", max_attempts, operation, error);
                    return Err(RetryError::Exhausted {
                        operation: operation.to_owned(),
                        attempts: attempt,
                        last: error,
                    });
                }
                let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
                warn!(
                    "Attempt {} of {} failed for {}, retrying in {:?}: {}",
                    attempt, max_attempts, operation, delay, error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Transient,
        Fatal,
    }

    impl Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn transient(e: &Failure) -> bool {
        *e == Failure::Transient
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = retry_with_backoff(
            &RetryPolicy::immediate(3),
            "flaky op",
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(Failure::Transient)
                    } else {
                        Ok(attempt)
                    }
                }
            },
            transient,
        )
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn exhausts_budget() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &RetryPolicy::immediate(4),
            "always failing",
            |_| {
                calls.set(calls.get() + 1);
                async { Err(Failure::Transient) }
            },
            transient,
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(calls.get(), 4);
        assert_eq!(err.into_inner(), Failure::Transient);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &RetryPolicy::immediate(5),
            "fatal op",
            |_| {
                calls.set(calls.get() + 1);
                async { Err(Failure::Fatal) }
            },
            transient,
        )
        .await;
        assert!(!result.unwrap_err().is_exhausted());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_doubles_from_initial_delay() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        let mut backoff = policy.backoff();
        let delays: Vec<u64> = (0..3)
            .filter_map(|_| backoff.next_backoff())
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8]);
    }
}
