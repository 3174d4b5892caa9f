use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::ResilienceError;

/// Failures in a row, in the `Closed` state, before the breaker trips.
const FAILURE_THRESHOLD: u32 = 5;
/// Consecutive successes in `HalfOpen` before the breaker closes again.
const SUCCESS_THRESHOLD: u32 = 2;
/// Time an `Open` breaker waits before allowing a single probe call.
const OPEN_TIMEOUT_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-service circuit breaker guarding an RPC client (spec §C / the
/// resilience layer wrapping Evaluator/Generator/Opportunity calls).
///
/// `HalfOpen` only ever admits one in-flight probe call at a time; the
/// `half_open_in_flight` flag is what enforces that, mirroring the original
/// breaker's single-probe semantics rather than letting every caller retry
/// simultaneously the instant the timeout elapses.
pub struct CircuitBreaker {
    service: String,
    state: Mutex<CircuitState>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at_unix: AtomicU64,
    half_open_in_flight: Mutex<bool>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            service: service.into(),
            state: Mutex::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at_unix: AtomicU64::new(0),
            half_open_in_flight: Mutex::new(false),
        })
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.lock().await
    }

    /// Runs `call` if the breaker currently admits traffic, recording the
    /// outcome against the state machine. Returns `ResilienceError::CircuitOpen`
    /// / `CircuitHalfOpen` without invoking `call` when it doesn't.
    pub async fn call<F, Fut, T, E>(&self, call: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.admit().await?;

        match call().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(ResilienceError::RetryExhausted {
                    attempts: 1,
                    cause: Box::new(err),
                })
            }
        }
    }

    async fn admit(&self) -> Result<(), ResilienceError> {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = self.opened_at_unix.load(Ordering::SeqCst) as i64;
                if Utc::now().timestamp() - opened_at >= OPEN_TIMEOUT_SECS {
                    *state = CircuitState::HalfOpen;
                    *self.half_open_in_flight.lock().await = true;
                    info!(service = %self.service, "circuit breaker moving to half-open");
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen {
                        service: self.service.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                let mut in_flight = self.half_open_in_flight.lock().await;
                if *in_flight {
                    Err(ResilienceError::CircuitHalfOpen {
                        service: self.service.clone(),
                    })
                } else {
                    *in_flight = true;
                    Ok(())
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                *self.half_open_in_flight.lock().await = false;
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= SUCCESS_THRESHOLD {
                    *state = CircuitState::Closed;
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                    info!(service = %self.service, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= FAILURE_THRESHOLD {
                    self.trip(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                *self.half_open_in_flight.lock().await = false;
                self.consecutive_successes.store(0, Ordering::SeqCst);
                self.trip(&mut state);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, state: &mut CircuitState) {
        *state = CircuitState::Open;
        self.opened_at_unix
            .store(Utc::now().timestamp() as u64, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        warn!(service = %self.service, "circuit breaker open");
    }
}

/// Process-wide registry of named circuit breakers (spec §4.6: "Named
/// instances are registered in a process-wide registry keyed by service
/// name; state is observable for health reporting"). Modelled as an explicit
/// handle constructed at startup per §9's "no process-wide singletons"
/// redesign flag, rather than a global `static`.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker for `service`, creating it on first use.
    pub async fn get_or_create(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(service) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(service.to_string())
            .or_insert_with(|| CircuitBreaker::new(service))
            .clone()
    }

    /// A snapshot of every registered breaker's state, for the health
    /// endpoint's `checks` map (spec §6).
    pub async fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let breakers = self.breakers.read().await;
        let mut states = Vec::with_capacity(breakers.len());
        for (service, breaker) in breakers.iter() {
            states.push((service.clone(), breaker.state().await));
        }
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_returns_the_same_breaker_for_repeat_lookups() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("evaluator-1").await;
        let b = registry.get_or_create("evaluator-1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new("evaluator-1");
        for _ in 0..FAILURE_THRESHOLD {
            let _ = breaker
                .call(|| async { Err::<(), _>(std::io::Error::other("boom")) })
                .await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new("evaluator-2");
        for _ in 0..FAILURE_THRESHOLD - 1 {
            let _ = breaker
                .call(|| async { Err::<(), _>(std::io::Error::other("boom")) })
                .await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
