//! In-memory order cache.
//!
//! [`OrderCache`] is a read-optimized mirror of the store keyed by `order_uid`. It is never the
//! source of truth: entries only arrive after the store accepted them (ingestion), after the
//! store returned them (lookup write-back) or from a bulk load of the store (bootstrap).
//!
//! One reader-writer lock guards the whole map. Every critical section is a single map
//! operation, so the lock is never held across I/O and the map is always consistent, even if a
//! holder panicked.

use crate::metrics::CacheMetrics;
use order_stream_core::{Order, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;

/// Errors from populating the cache in bulk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    /// The bulk loader failed. The cache was left untouched.
    #[error("Failed to load orders from store: {0}")]
    Load(#[from] StoreError),

    /// The bulk load did not finish in time.
    #[error("Cache restore did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Concurrent map from `order_uid` to [`Order`].
///
/// No expiry, no eviction: entries live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct OrderCache {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `order.order_uid`.
    pub fn set(&self, order: Order) {
        let mut orders = self.write();
        orders.insert(order.order_uid.clone(), order);
        CacheMetrics::record_size(orders.len());
    }

    /// Insert `order` unless its id is already cached.
    ///
    /// Returns the entry that is cached afterwards: the existing one if there was one,
    /// otherwise `order`. Used for read-side write-back, which must never replace a newer
    /// entry written by ingestion while the store read was in flight.
    pub fn set_if_absent(&self, order: Order) -> Order {
        let mut orders = self.write();
        let cached = orders
            .entry(order.order_uid.clone())
            .or_insert(order)
            .clone();
        CacheMetrics::record_size(orders.len());
        cached
    }

    /// Look up an order. Absence is a normal result.
    #[must_use]
    pub fn get(&self, order_uid: &str) -> Option<Order> {
        self.read().get(order_uid).cloned()
    }

    /// Snapshot of every cached order, in no particular order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Order> {
        self.read().values().cloned().collect()
    }

    /// Number of cached orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Populate the cache from a bulk loader.
    ///
    /// The loader runs exactly once, without the lock held. Its result is then inserted under
    /// a single write lock, so concurrent readers see either none or all of it. Duplicate ids
    /// in the loader output collapse to the last one.
    ///
    /// Returns the number of entries in the cache afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError::Load`] if the loader fails; the cache is unchanged.
    pub async fn restore_from_store<F, Fut>(&self, loader: F) -> Result<usize, RestoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Order>, StoreError>>,
    {
        let loaded = loader().await?;

        let mut orders = self.write();
        for order in loaded {
            orders.insert(order.order_uid.clone(), order);
        }
        CacheMetrics::record_size(orders.len());
        Ok(orders.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Order>> {
        self.orders.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Order>> {
        self.orders.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use order_stream_testing::fixtures::sample_order;
    use proptest::prelude::*;

    #[test]
    fn set_then_get() {
        let cache = OrderCache::new();
        cache.set(sample_order("a1"));

        assert_eq!(cache.get("a1"), Some(sample_order("a1")));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn set_overwrites() {
        let cache = OrderCache::new();
        cache.set(sample_order("a1"));

        let mut updated = sample_order("a1");
        updated.track_number = "NEWTRACK".to_string();
        cache.set(updated.clone());

        assert_eq!(cache.get("a1"), Some(updated));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn set_if_absent_keeps_existing_entry() {
        let cache = OrderCache::new();
        let mut newer = sample_order("a1");
        newer.track_number = "NEWER".to_string();
        cache.set(newer.clone());

        let kept = cache.set_if_absent(sample_order("a1"));

        assert_eq!(kept, newer);
        assert_eq!(cache.get("a1"), Some(newer));
    }

    #[test]
    fn set_if_absent_inserts_missing_entry() {
        let cache = OrderCache::new();

        let inserted = cache.set_if_absent(sample_order("a1"));

        assert_eq!(inserted, sample_order("a1"));
        assert_eq!(cache.get("a1"), Some(sample_order("a1")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn restore_collapses_duplicates_to_last() {
        let cache = OrderCache::new();
        let mut second = sample_order("dup");
        second.locale = "ru".to_string();
        let loaded = vec![sample_order("dup"), sample_order("other"), second.clone()];

        let count = cache
            .restore_from_store(|| async move { Ok(loaded) })
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(cache.get("dup"), Some(second));
    }

    #[tokio::test]
    async fn failed_restore_leaves_cache_untouched() {
        let cache = OrderCache::new();
        cache.set(sample_order("kept"));

        let result = cache
            .restore_from_store(|| async { Err(StoreError::Unavailable("down".into())) })
            .await;

        assert!(matches!(result, Err(RestoreError::Load(StoreError::Unavailable(_)))));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("kept").is_some());
    }

    #[tokio::test]
    async fn restore_then_get_all_matches_loader() {
        let cache = OrderCache::new();
        let loaded: Vec<Order> = (0..25).map(|i| sample_order(&format!("o{i}"))).collect();
        let expected = loaded.clone();

        cache
            .restore_from_store(|| async move { Ok(loaded) })
            .await
            .unwrap();

        let mut all = cache.get_all();
        all.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
        let mut expected = expected;
        expected.sort_by(|a, b| a.order_uid.cmp(&b.order_uid));
        assert_eq!(all, expected);
    }

    proptest! {
        #[test]
        fn get_returns_what_was_set(ids in prop::collection::hash_set("[a-z0-9]{1,12}", 1..20)) {
            let cache = OrderCache::new();
            for id in &ids {
                cache.set(sample_order(id));
            }

            for id in &ids {
                prop_assert_eq!(cache.get(id).map(|o| o.order_uid), Some(id.clone()));
            }
            prop_assert_eq!(cache.len(), ids.len());
        }

        #[test]
        fn absent_ids_are_none(ids in prop::collection::vec("[a-z]{1,8}", 0..10), missing in "[A-Z]{1,8}") {
            let cache = OrderCache::new();
            for id in &ids {
                cache.set(sample_order(id));
            }

            // Looked-up ids are uppercase, stored ids are lowercase.
            prop_assert!(cache.get(&missing).is_none());
        }
    }
}
