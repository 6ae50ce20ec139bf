//! Read-through cache for slot listings.
//!
//! Entries expire after a fixed TTL, and every write that changes a
//! listing invalidates the affected keys explicitly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;

use crate::models::SlotAvailability;
use crate::utils::{AppError, AppResult};

const MAX_ENTRIES: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKey {
    All,
    Day(NaiveDate),
}

impl From<Option<NaiveDate>> for ListingKey {
    fn from(date: Option<NaiveDate>) -> Self {
        date.map_or(ListingKey::All, ListingKey::Day)
    }
}

pub type Listing = Arc<Vec<SlotAvailability>>;

#[derive(Clone)]
pub struct SlotCache {
    inner: Cache<ListingKey, Listing>,
}

impl SlotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Returns the cached listing or runs `load` once, even under concurrent misses.
    pub async fn get_or_load<F, Fut>(&self, key: ListingKey, load: F) -> AppResult<Listing>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Vec<SlotAvailability>>>,
    {
        self.inner
            .try_get_with(key, async move { load().await.map(Arc::new) })
            .await
            .map_err(|e| {
                Arc::try_unwrap(e).unwrap_or_else(|shared| {
                    AppError::InternalServerError(format!("slot listing failed: {shared}"))
                })
            })
    }

    /// Drops the listing of `date` and the all-slots listing.
    pub async fn invalidate_day(&self, date: NaiveDate) {
        self.inner.invalidate(&ListingKey::Day(date)).await;
        self.inner.invalidate(&ListingKey::All).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    async fn load(cache: &SlotCache, key: ListingKey, calls: &AtomicUsize) -> Listing {
        cache
            .get_or_load(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_after_populate() {
        let cache = SlotCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        load(&cache, ListingKey::Day(day(1)), &calls).await;
        load(&cache, ListingKey::Day(day(1)), &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_day_drops_day_and_all_only() {
        let cache = SlotCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        for key in [ListingKey::All, ListingKey::Day(day(1)), ListingKey::Day(day(2))] {
            load(&cache, key, &calls).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache.invalidate_day(day(1)).await;
        for key in [ListingKey::All, ListingKey::Day(day(1)), ListingKey::Day(day(2))] {
            load(&cache, key, &calls).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = SlotCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_load(ListingKey::All, || async {
                Err(AppError::ValidationError("boom".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let calls = AtomicUsize::new(0);
        load(&cache, ListingKey::All, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let cache = SlotCache::new(Duration::from_millis(50));
        let calls = AtomicUsize::new(0);
        load(&cache, ListingKey::All, &calls).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        load(&cache, ListingKey::All, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
