//! The Resilience Layer (R): retry with backoff, a per-service circuit
//! breaker, and the fingerprint-keyed recommendation/analytics cache.
//! Grounded on the original system's `circuit_breaker.py`, `retry.py` and
//! `recommendation_cache.py`.

pub mod cache;
pub mod circuit_breaker;
pub mod retry;

pub use cache::{Cache, CacheStats, NamespaceCounts};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use retry::{retry_with_backoff, RetryConfig, RetryStats};
