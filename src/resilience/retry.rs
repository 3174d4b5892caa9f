use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use tracing::warn;

use crate::error::ResilienceError;

/// Exponential backoff with jitter, grounded on the original system's
/// `retry.py`: `base_delay * 2^attempt`, capped at `max_delay`, then scaled
/// by a uniform jitter factor so concurrently retrying callers don't
/// thunder-herd back onto the same recovering service.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_range: (f64, f64),
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_range: (0.5, 1.5),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exp.min(self.max_delay_ms) as f64;
        let jitter = rand::rng().random_range(self.jitter_range.0..self.jitter_range.1);
        std::time::Duration::from_millis((capped * jitter) as u64)
    }
}

/// Running counters exposed for the `retry_stats` diagnostics the original
/// system surfaces per guarded call site.
#[derive(Debug, Default)]
pub struct RetryStats {
    pub attempts: AtomicU32,
    pub successes: AtomicU32,
    pub failures: AtomicU32,
}

impl RetryStats {
    pub fn snapshot(&self) -> (u32, u32, u32) {
        (
            self.attempts.load(Ordering::Relaxed),
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

/// Retries `operation` up to `config.max_attempts` times with backoff,
/// returning the last error wrapped in [`ResilienceError::RetryExhausted`]
/// if every attempt fails.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    stats: &RetryStats,
    mut operation: F,
) -> Result<T, ResilienceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut last_err: Option<E> = None;
    for attempt in 0..config.max_attempts {
        stats.attempts.fetch_add(1, Ordering::Relaxed);
        match operation().await {
            Ok(value) => {
                stats.successes.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            Err(err) => {
                warn!(attempt, error = %err, "retryable call failed");
                last_err = Some(err);
                if attempt + 1 < config.max_attempts {
                    tokio::time::sleep(config.delay_for(attempt)).await;
                }
            }
        }
    }
    stats.failures.fetch_add(1, Ordering::Relaxed);
    Err(ResilienceError::RetryExhausted {
        attempts: config.max_attempts,
        cause: Box::new(last_err.expect("loop runs at least once since max_attempts >= 1")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_range: (1.0, 1.0),
        };
        let stats = RetryStats::default();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&config, &stats, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(std::io::Error::other("not yet"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.snapshot().1, 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_range: (1.0, 1.0),
        };
        let stats = RetryStats::default();
        let result: Result<(), _> =
            retry_with_backoff(&config, &stats, || async { Err(std::io::Error::other("boom")) })
                .await;
        assert!(result.is_err());
        assert_eq!(stats.snapshot().2, 1);
    }
}
