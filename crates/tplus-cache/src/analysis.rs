use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use moka::future::Cache;
use tplus_models::{AnalysisMode, Recommendation};

use crate::clock::{Clock, SystemClock};

/// Identifies one analysis: entity, local calendar day, analyzer mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: String,
    pub date: String,
    pub mode: AnalysisMode,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.entity_id, self.date, self.mode)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub result: Recommendation,
    pub stored_at: DateTime<Local>,
}

/// Process-lifetime memo of recommendations, shared by all workers.
///
/// Entries are never evicted. An entry older than the expiry window reads as
/// absent but stays in the map until a later `store` for the same key
/// overwrites it.
pub struct AnalysisCache {
    inner: Cache<CacheKey, CacheEntry>,
    expiry: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl AnalysisCache {
    pub fn new(expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Cache::builder().build(),
            expiry: chrono::Duration::from_std(expiry)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
            clock,
        }
    }

    pub fn with_system_clock(expiry: Duration) -> Self {
        Self::new(expiry, Arc::new(SystemClock))
    }

    /// Key for `entity_id` analyzed in `mode` today.
    pub fn key(&self, entity_id: &str, mode: AnalysisMode) -> CacheKey {
        CacheKey {
            entity_id: entity_id.to_string(),
            date: self.clock.today(),
            mode,
        }
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<Recommendation> {
        let entry = self.inner.get(key).await?;
        if self.clock.now() - entry.stored_at >= self.expiry {
            tracing::debug!(key = %key, "Cached analysis expired");
            return None;
        }
        Some(entry.result)
    }

    pub async fn store(&self, key: CacheKey, result: Recommendation) {
        let entry = CacheEntry {
            result,
            stored_at: self.clock.now(),
        };
        self.inner.insert(key, entry).await;
    }

    /// The stored entry regardless of expiry.
    pub async fn raw_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use tplus_models::Action;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn setup() -> (Arc<ManualClock>, AnalysisCache) {
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2024, 3, 8, 10, 0, 0).unwrap(),
        ));
        let cache = AnalysisCache::new(DAY, clock.clone());
        (clock, cache)
    }

    fn buy() -> Recommendation {
        Recommendation {
            action: Action::Buy,
            reason: "breakout".to_string(),
            predicted_price: 10.5,
            predicted_buy_price: 10.1,
            predicted_sell_price: 10.8,
            confidence: 0.7,
        }
    }

    #[test]
    fn key_uses_clock_date_and_mode() {
        let (_, cache) = setup();
        let key = cache.key("600000", AnalysisMode::Staged);
        assert_eq!(key.date, "2024-03-08");
        assert_eq!(key.to_string(), "600000_2024-03-08_staged");
        assert_ne!(key, cache.key("600000", AnalysisMode::Single));
    }

    #[tokio::test]
    async fn store_and_lookup() {
        let (_, cache) = setup();
        let key = cache.key("600000", AnalysisMode::Staged);
        cache.store(key.clone(), buy()).await;

        assert_eq!(cache.lookup(&key).await, Some(buy()));
    }

    #[tokio::test]
    async fn lookup_missing() {
        let (_, cache) = setup();
        let key = cache.key("600000", AnalysisMode::Single);
        assert_eq!(cache.lookup(&key).await, None);
    }

    #[tokio::test]
    async fn modes_do_not_share_entries() {
        let (_, cache) = setup();
        cache
            .store(cache.key("600000", AnalysisMode::Staged), buy())
            .await;
        let single = cache.key("600000", AnalysisMode::Single);
        assert_eq!(cache.lookup(&single).await, None);
    }

    #[tokio::test]
    async fn expired_entry_reads_absent_but_is_kept() {
        let (clock, cache) = setup();
        let key = cache.key("600000", AnalysisMode::Staged);
        cache.store(key.clone(), buy()).await;

        clock.advance(chrono::Duration::hours(23));
        assert!(cache.lookup(&key).await.is_some());

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(cache.lookup(&key).await, None);
        assert!(cache.raw_entry(&key).await.is_some());
    }

    #[tokio::test]
    async fn store_overwrites_expired_entry() {
        let (clock, cache) = setup();
        let key = cache.key("600000", AnalysisMode::Staged);
        cache.store(key.clone(), buy()).await;
        clock.advance(chrono::Duration::hours(30));

        let fresh = Recommendation::unparsed();
        cache.store(key.clone(), fresh.clone()).await;
        assert_eq!(cache.lookup(&key).await, Some(fresh));
    }

    #[tokio::test]
    async fn concurrent_stores_on_distinct_keys() {
        let (_, cache) = setup();
        let cache = Arc::new(cache);
        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let key = cache.key(&format!("{i:06}"), AnalysisMode::Single);
                let mut rec = Recommendation::unparsed();
                rec.predicted_price = i as f64;
                cache.store(key, rec).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..32 {
            let key = cache.key(&format!("{i:06}"), AnalysisMode::Single);
            let rec = cache.lookup(&key).await.unwrap();
            assert_eq!(rec.predicted_price, i as f64);
        }
    }
}
