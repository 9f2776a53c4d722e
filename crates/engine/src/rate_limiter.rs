//! Byte-rate limiting for downloads.
//!
//! A token bucket where one token is one byte. The bucket holds at most one
//! second worth of bytes, so short bursts are allowed but the long-run rate
//! never exceeds the configured ceiling. A chunk larger than the bucket puts
//! it into debt and the caller waits until the debt is repaid.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::DownloadError;

/// Token bucket rate limiter measured in bytes.
#[derive(Debug)]
pub struct RateLimiter {
    /// Current number of tokens, negative while in debt.
    tokens: f64,
    /// Maximum tokens (burst capacity).
    max_tokens: f64,
    /// Bytes added per second.
    refill_rate: f64,
    /// Last refill time.
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter for `bytes_per_second`. The bucket starts full.
    pub fn new(bytes_per_second: u64) -> Self {
        let rate = bytes_per_second.max(1) as f64;
        Self {
            tokens: rate,
            max_tokens: rate,
            refill_rate: rate,
            last_refill: Instant::now(),
        }
    }

    /// Build an optional limiter from a configured ceiling.
    pub fn from_limit(limit: Option<u64>) -> Option<Self> {
        limit.filter(|rate| *rate > 0).map(Self::new)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.refill_rate as u64
    }

    /// Account for `bytes` just transferred, waiting if the bucket is in debt.
    ///
    /// Returns the duration waited. Cancelling `token` aborts the wait with
    /// [`DownloadError::Cancelled`].
    pub async fn acquire(
        &mut self,
        bytes: usize,
        token: &CancellationToken,
    ) -> Result<Duration, DownloadError> {
        self.refill();
        self.tokens -= bytes as f64;

        if self.tokens >= 0.0 {
            return Ok(Duration::ZERO);
        }

        let wait = Duration::from_secs_f64(-self.tokens / self.refill_rate);
        trace!(bytes, wait_ms = wait.as_millis() as u64, "Rate limited");

        tokio::select! {
            _ = token.cancelled() => Err(DownloadError::Cancelled),
            _ = tokio::time::sleep(wait) => {
                self.refill();
                Ok(wait)
            }
        }
    }

    /// Get the time until the bucket is out of debt.
    pub fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_rate)
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let new_tokens = elapsed.as_secs_f64() * self.refill_rate;

        self.tokens = (self.tokens + new_tokens).min(self.max_tokens);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_within_capacity_does_not_wait() {
        let token = CancellationToken::new();
        let mut limiter = RateLimiter::new(1024);
        assert_eq!(limiter.acquire(512, &token).await.unwrap(), Duration::ZERO);
        assert_eq!(limiter.acquire(512, &token).await.unwrap(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_rate_is_capped() {
        let token = CancellationToken::new();
        let mut limiter = RateLimiter::new(1000);
        let start = Instant::now();

        // 1000 bytes of burst plus 3000 bytes that must be paced.
        for _ in 0..8 {
            limiter.acquire(500, &token).await.unwrap();
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2990), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3500), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_chunk_goes_into_debt() {
        let token = CancellationToken::new();
        let mut limiter = RateLimiter::new(100);
        let waited = limiter.acquire(300, &token).await.unwrap();
        assert_eq!(waited, Duration::from_secs(2));
        assert_eq!(limiter.time_until_available(), Duration::ZERO);
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let token = CancellationToken::new();
        token.cancel();
        let mut limiter = RateLimiter::new(10);
        let result = limiter.acquire(1000, &token).await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }

    #[test]
    fn zero_limit_means_unlimited() {
        assert!(RateLimiter::from_limit(None).is_none());
        assert!(RateLimiter::from_limit(Some(0)).is_none());
        assert_eq!(
            RateLimiter::from_limit(Some(2048)).unwrap().bytes_per_second(),
            2048
        );
    }
}
