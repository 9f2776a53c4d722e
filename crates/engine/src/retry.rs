// Retry combinator shared by whole-file and per-fragment downloads.
//
// Backoff is linear: the wait after failed attempt `n` (1-based) is
// `n * base_delay`, optionally followed by a small random jitter.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::DownloadError;

/// Delay to wait after the failed attempt `attempt` (0-indexed).
pub type BackoffFn = fn(u32, Duration) -> Duration;

/// `(attempt + 1) * base`: 1x, 2x, 3x ... the base delay.
pub fn linear_backoff(attempt: u32, base: Duration) -> Duration {
    base.checked_mul(attempt.saturating_add(1))
        .unwrap_or(Duration::MAX)
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Unit handed to `backoff`.
    pub base_delay: Duration,
    pub backoff: BackoffFn,
    /// When true, adds random jitter of [0, base_delay/4) on top of the backoff.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff: linear_backoff,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Compute the delay after a failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = (self.backoff)(attempt, self.base_delay);
        if !self.jitter {
            return delay;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 4;
        if jitter_range_ms == 0 {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..jitter_range_ms);
        delay.saturating_add(Duration::from_millis(jitter_ms))
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    Success(T),
    /// Transient failure, try again if attempts remain.
    Retry(DownloadError),
    /// Permanent failure, stop now.
    Fail(DownloadError),
}

impl<T> RetryAction<T> {
    /// Classify an attempt result by [`DownloadError::is_retryable`].
    pub fn from_result(result: Result<T, DownloadError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) if e.is_retryable() => Self::Retry(e),
            Err(e) => Self::Fail(e),
        }
    }
}

/// Execute an async operation with retry-and-backoff.
///
/// `operation` receives the attempt number (0-indexed). `on_failure` runs once
/// for every retryable failed attempt, including the last. It never runs for
/// a [`RetryAction::Fail`] or a cancellation. Cancelling `token` interrupts
/// the backoff wait.
pub async fn retry_with_backoff<F, Fut, T, H>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
    on_failure: H,
) -> Result<T, DownloadError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
    H: Fn(u32, &DownloadError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let err = match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(DownloadError::Cancelled)
            | RetryAction::Retry(DownloadError::Cancelled) => {
                return Err(DownloadError::Cancelled);
            }
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                on_failure(attempt, &err);
                err
            }
        };

        if attempt + 1 >= max_attempts {
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            max = max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => {
                return Err(DownloadError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// Classify a reqwest error as retryable or non-retryable.
///
/// Retryable: connect, timeout, request, body read, and decode errors.
/// Non-retryable: redirect and builder errors.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn forbidden() -> DownloadError {
        DownloadError::network(StatusCode::FORBIDDEN, "https://cdn.example.com/a.mp4")
    }

    #[test]
    fn linear_delays_grow_by_base() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(3000));
    }

    #[test]
    fn jitter_only_adds() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(400)).with_jitter(true);
        for _ in 0..32 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay < Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_records_no_failure() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(10));
        let token = CancellationToken::new();
        let failures = AtomicU32::new(0);
        let result = retry_with_backoff(
            &policy,
            &token,
            |_| async { RetryAction::Success(42u32) },
            |_, _| {
                failures.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn fails_immediately_on_non_retryable() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(10));
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let failures = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(
            &policy,
            &token,
            |_| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async { RetryAction::Fail(DownloadError::playlist("empty")) }
            },
            |_, _| {
                failures.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await;
        assert!(matches!(result, Err(DownloadError::Playlist { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_with_linear_waits() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1000));
        let token = CancellationToken::new();
        let started = Instant::now();
        let attempt_times = Mutex::new(Vec::new());
        let failures = AtomicU32::new(0);

        let result: Result<u32, _> = retry_with_backoff(
            &policy,
            &token,
            |_| {
                attempt_times.lock().unwrap().push(started.elapsed());
                async { RetryAction::Retry(forbidden()) }
            },
            |_, _| {
                failures.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("403"));
        assert_eq!(failures.load(Ordering::Relaxed), 3);

        let times = attempt_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= Duration::from_millis(1000));
        assert!(times[2] - times[1] >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let token = CancellationToken::new();
        let failures = AtomicU32::new(0);
        let result = retry_with_backoff(
            &policy,
            &token,
            |attempt| async move {
                if attempt == 0 {
                    RetryAction::Retry(forbidden())
                } else {
                    RetryAction::Success(99u32)
                }
            },
            |_, _| {
                failures.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));
        let token = CancellationToken::new();
        let failures = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(
            &policy,
            &token,
            |_| async { RetryAction::Fail(DownloadError::Cancelled) },
            |_, _| {
                failures.fetch_add(1, Ordering::Relaxed);
            },
        )
        .await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_backoff() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(100));
        let token = CancellationToken::new();
        let canceller = token.clone();
        let result: Result<u32, _> = retry_with_backoff(
            &policy,
            &token,
            |_| {
                canceller.cancel();
                async { RetryAction::Retry(forbidden()) }
            },
            |_, _| {},
        )
        .await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }
}
