use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CacheError, PlannerResult};
use crate::model::{CacheCategory, CacheEntry, PortfolioFingerprint};

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
        )
    }
}

/// The recommendation/analytics cache (spec resilience layer): keyed on a
/// [`PortfolioFingerprint`] plus a namespace suffix, postcard-encoded,
/// TTL-swept lazily on read. Grounded on the original system's
/// `recommendation_cache.py`, which keeps the two namespaces separate so a
/// bulk invalidation of one never disturbs the other.
#[derive(Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    pub stats: CacheStats,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(fingerprint: &PortfolioFingerprint, category: CacheCategory, suffix: &str) -> String {
        format!("{}:{}:{}", category.namespace(), fingerprint, suffix)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        fingerprint: &PortfolioFingerprint,
        category: CacheCategory,
        suffix: &str,
        as_of: DateTime<Utc>,
    ) -> PlannerResult<Option<T>> {
        let key = Self::key(fingerprint, category, suffix);
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(&key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };
        if entry.is_expired(as_of) {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        match postcard::from_bytes(&entry.payload) {
            Ok(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Err(_) => {
                debug!(%key, "cache entry failed to decode, treating as a miss");
                Err(CacheError::CacheCorrupt(key).into())
            }
        }
    }

    pub async fn put<T: Serialize>(
        &self,
        fingerprint: &PortfolioFingerprint,
        category: CacheCategory,
        suffix: &str,
        value: &T,
        as_of: DateTime<Utc>,
    ) -> PlannerResult<()> {
        let key = Self::key(fingerprint, category, suffix);
        let payload = postcard::to_allocvec(value)
            .map_err(|err| CacheError::CacheCorrupt(format!("{key}: {err}")))?;
        let entry = CacheEntry::new(payload, category, as_of);
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    /// Drops every entry for a given fingerprint, across both namespaces;
    /// used when a plan is executed and its recommendation is no longer
    /// valid for the portfolio it produced.
    pub async fn invalidate(&self, fingerprint: &PortfolioFingerprint) {
        let needle = fingerprint.to_hex();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.contains(&needle));
        let removed = before - entries.len();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Sweeps expired entries. Called periodically rather than on every
    /// read so a burst of lookups against a single stale key doesn't pay
    /// for a full-map scan each time.
    pub async fn sweep_expired(&self, as_of: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(as_of));
        let removed = before - entries.len();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drops every entry across both namespaces (spec §4.6 `invalidate_all`).
    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Total and still-valid entry counts per namespace (SPEC_FULL B.6:
    /// the original's `get_cache_stats`), for health reporting.
    pub async fn namespace_counts(&self, as_of: DateTime<Utc>) -> NamespaceCounts {
        let entries = self.entries.read().await;
        let mut counts = NamespaceCounts::default();
        for entry in entries.values() {
            let (total, valid) = match entry.category {
                CacheCategory::Recommendation => (&mut counts.recommendation_total, &mut counts.recommendation_valid),
                CacheCategory::Analytics => (&mut counts.analytics_total, &mut counts.analytics_valid),
            };
            *total += 1;
            if !entry.is_expired(as_of) {
                *valid += 1;
            }
        }
        counts
    }
}

/// Snapshot returned by [`Cache::namespace_counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceCounts {
    pub recommendation_total: usize,
    pub recommendation_valid: usize,
    pub analytics_total: usize,
    pub analytics_valid: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Eur, PortfolioContext, Position, Symbol};
    use crate::sorted_vec_map::SortedVecMap;

    fn sample_fingerprint() -> PortfolioFingerprint {
        let context = PortfolioContext {
            as_of: Utc::now(),
            cash: Eur(1_000.0),
            positions: {
                let mut map = SortedVecMap::new();
                map.insert(
                    Symbol::from("ACME"),
                    Position {
                        symbol: Symbol::from("ACME"),
                        quantity: 10,
                        avg_price: Eur(10.0),
                        current_price: Eur(12.0),
                        opened_at: Utc::now(),
                        flat_since: None,
                        last_buy_at: None,
                        last_sell_at: None,
                    },
                );
                map
            },
            securities: SortedVecMap::new(),
            country_targets: SortedVecMap::new(),
            industry_targets: SortedVecMap::new(),
            ..Default::default()
        };
        PortfolioFingerprint::compute(&context)
    }

    #[tokio::test]
    async fn round_trips_a_cached_value() {
        let cache = Cache::new();
        let fingerprint = sample_fingerprint();
        let now = Utc::now();
        cache
            .put(&fingerprint, CacheCategory::Recommendation, "v1", &42u32, now)
            .await
            .unwrap();
        let value: Option<u32> = cache
            .get(&fingerprint, CacheCategory::Recommendation, "v1", now)
            .await
            .unwrap();
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn expired_entries_read_as_a_miss() {
        let cache = Cache::new();
        let fingerprint = sample_fingerprint();
        let now = Utc::now();
        cache
            .put(&fingerprint, CacheCategory::Analytics, "risk", &1.0f64, now)
            .await
            .unwrap();
        let later = now + chrono::Duration::hours(5);
        let value: Option<f64> = cache
            .get(&fingerprint, CacheCategory::Analytics, "risk", later)
            .await
            .unwrap();
        assert_eq!(value, None);
    }
}
