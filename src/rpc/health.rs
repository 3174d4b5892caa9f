//! The health endpoint (spec §6), shared by every service: `{healthy,
//! version, status, checks}` where `checks` surfaces whatever diagnostics a
//! given service owns — the coordinator's circuit-breaker snapshot, the
//! cache's namespace counts. Grounded on SPEC_FULL.md B.3/B.6's
//! supplemented retry/circuit-breaker and cache statistics.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::resilience::{Cache, CircuitBreakerRegistry, CircuitState};

use super::types::HealthResponse;

pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn circuit_state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

/// Builds a [`HealthResponse`] for the coordinator: one `checks` entry per
/// registered evaluator circuit breaker, plus an overall `status` that
/// degrades to `"degraded"` if any breaker is open.
pub async fn coordinator_health(breakers: &CircuitBreakerRegistry) -> HealthResponse {
    let snapshot = breakers.snapshot().await;
    let mut checks = BTreeMap::new();
    let mut any_open = false;
    for (service, state) in &snapshot {
        if matches!(state, CircuitState::Open) {
            any_open = true;
        }
        checks.insert(format!("circuit:{service}"), circuit_state_label(*state).to_string());
    }
    HealthResponse {
        healthy: !any_open,
        version: CRATE_VERSION.to_string(),
        status: if any_open { "degraded".to_string() } else { "ok".to_string() },
        checks,
    }
}

/// Builds a [`HealthResponse`] for the resilience cache: entry counts per
/// namespace plus the running hit/miss/eviction totals.
pub async fn cache_health(cache: &Cache) -> HealthResponse {
    let counts = cache.namespace_counts(Utc::now()).await;
    let (hits, misses, evictions) = cache.stats.snapshot();
    let mut checks = BTreeMap::new();
    checks.insert("recommendation_entries".to_string(), counts.recommendation_valid.to_string());
    checks.insert("analytics_entries".to_string(), counts.analytics_valid.to_string());
    checks.insert("hits".to_string(), hits.to_string());
    checks.insert("misses".to_string(), misses.to_string());
    checks.insert("evictions".to_string(), evictions.to_string());
    HealthResponse {
        healthy: true,
        version: CRATE_VERSION.to_string(),
        status: "ok".to_string(),
        checks,
    }
}

/// A stateless service (generator, opportunity identifier, evaluator) has
/// nothing to report beyond "the process is up" — still a valid health
/// response per spec §6's shape.
pub fn stateless_health(service: &str) -> HealthResponse {
    let mut checks = BTreeMap::new();
    checks.insert("service".to_string(), service.to_string());
    HealthResponse {
        healthy: true,
        version: CRATE_VERSION.to_string(),
        status: "ok".to_string(),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn an_empty_registry_reports_healthy() {
        let breakers = CircuitBreakerRegistry::new();
        let response = coordinator_health(&breakers).await;
        assert!(response.healthy);
        assert_eq!(response.status, "ok");
    }

    #[tokio::test]
    async fn a_tripped_breaker_degrades_the_overall_status() {
        let breakers = CircuitBreakerRegistry::new();
        let breaker = breakers.get_or_create("evaluator-1").await;
        for _ in 0..6 {
            let _ = breaker
                .call(|| async { Err::<(), _>(std::io::Error::other("boom")) })
                .await;
        }

        let response = coordinator_health(&breakers).await;
        assert!(!response.healthy);
        assert_eq!(response.status, "degraded");
        assert_eq!(response.checks.get("circuit:evaluator-1"), Some(&"open".to_string()));
    }

    #[tokio::test]
    async fn cache_health_reports_zeroed_stats_for_a_fresh_cache() {
        let cache = Cache::new();
        let response = cache_health(&cache).await;
        assert!(response.healthy);
        assert_eq!(response.checks.get("hits"), Some(&"0".to_string()));
    }

    #[test]
    fn stateless_health_names_the_service() {
        let response = stateless_health("generator");
        assert!(response.healthy);
        assert_eq!(response.checks.get("service"), Some(&"generator".to_string()));
    }
}
