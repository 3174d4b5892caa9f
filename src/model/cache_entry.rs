use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two cache namespaces of the Resilience Layer (R), mirroring the
/// original system's separate recommendation/analytics stores so a sweep of
/// one never evicts the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheCategory {
    Recommendation,
    Analytics,
}

impl CacheCategory {
    pub fn namespace(self) -> &'static str {
        match self {
            CacheCategory::Recommendation => "recommendation_cache",
            CacheCategory::Analytics => "analytics_cache",
        }
    }

    /// Default time-to-live: recommendations are keyed on a portfolio
    /// fingerprint and can live long; analytics (risk metrics, scenario
    /// stats) are cheaper to recompute and refreshed more often.
    pub fn default_ttl(self) -> chrono::Duration {
        match self {
            CacheCategory::Recommendation => chrono::Duration::hours(48),
            CacheCategory::Analytics => chrono::Duration::hours(4),
        }
    }
}

/// A stored, postcard-encoded cache payload plus its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Vec<u8>,
    pub category: CacheCategory,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: Vec<u8>, category: CacheCategory, created_at: DateTime<Utc>) -> Self {
        let expires_at = created_at + category.default_ttl();
        Self {
            payload,
            category,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, as_of: DateTime<Utc>) -> bool {
        as_of >= self.expires_at
    }
}
