//! Cache-first order lookup with store fallback.

use crate::cache::OrderCache;
use crate::metrics::LookupMetrics;
use order_stream_core::{Order, OrderStore, StoreError};
use std::sync::Arc;

/// Result of looking an order up by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Served from the cache; the store was not touched.
    HitCache(Order),
    /// Cache miss, served from the store and written back to the cache.
    HitStore(Order),
    /// Neither the cache nor the store knows the id.
    NotFound,
    /// Cache miss and the store read failed.
    StoreFailure(StoreError),
}

impl LookupOutcome {
    /// Stable name used as a metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::HitCache(_) => "hit_cache",
            Self::HitStore(_) => "hit_store",
            Self::NotFound => "not_found",
            Self::StoreFailure(_) => "store_failure",
        }
    }

    /// The order, if one was found.
    #[must_use]
    pub fn into_order(self) -> Option<Order> {
        match self {
            Self::HitCache(order) | Self::HitStore(order) => Some(order),
            Self::NotFound | Self::StoreFailure(_) => None,
        }
    }
}

/// Read path over the cache and the store.
///
/// Cheap to clone; clones share the same cache and store.
#[derive(Clone)]
pub struct OrderLookup {
    cache: Arc<OrderCache>,
    store: Arc<dyn OrderStore>,
}

impl OrderLookup {
    /// Create a lookup service.
    #[must_use]
    pub fn new(cache: Arc<OrderCache>, store: Arc<dyn OrderStore>) -> Self {
        Self { cache, store }
    }

    /// Look an order up by id.
    ///
    /// Consults the cache first. On a miss, reads the store and, if the order exists, caches
    /// it so the next lookup for the same id is a cache hit. If ingestion cached the id while
    /// the store read was in flight, that entry wins and is returned.
    pub async fn get_by_id(&self, order_uid: &str) -> LookupOutcome {
        let outcome = self.resolve(order_uid).await;
        LookupMetrics::record(outcome.label());
        outcome
    }

    async fn resolve(&self, order_uid: &str) -> LookupOutcome {
        if let Some(order) = self.cache.get(order_uid) {
            return LookupOutcome::HitCache(order);
        }

        match self.store.find_one(order_uid).await {
            Ok(Some(order)) => {
                tracing::debug!(order_uid = %order_uid, "Cache miss served from store");
                LookupOutcome::HitStore(self.cache.set_if_absent(order))
            }
            Ok(None) => LookupOutcome::NotFound,
            Err(e) => {
                tracing::error!(order_uid = %order_uid, error = %e, "Store lookup failed");
                LookupOutcome::StoreFailure(e)
            }
        }
    }

    /// Every cached order, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Order> {
        self.cache.get_all()
    }

    /// The cache this service reads from.
    #[must_use]
    pub const fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    /// The store this service falls back to.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }
}

impl std::fmt::Debug for OrderLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLookup")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use order_stream_testing::fixtures::sample_order;
    use order_stream_testing::InMemoryOrderStore;
    use std::time::Duration;

    fn lookup_with(store: Arc<InMemoryOrderStore>) -> (OrderLookup, Arc<OrderCache>) {
        let cache = Arc::new(OrderCache::new());
        (OrderLookup::new(Arc::clone(&cache), store), cache)
    }

    #[tokio::test]
    async fn cache_hit_does_not_touch_store() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.fail_reads(true);
        let (lookup, cache) = lookup_with(Arc::clone(&store));
        cache.set(sample_order("a1"));

        let outcome = lookup.get_by_id("a1").await;

        assert_eq!(outcome, LookupOutcome::HitCache(sample_order("a1")));
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn miss_falls_back_and_writes_back() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.create(&sample_order("a1")).await.unwrap();
        let (lookup, cache) = lookup_with(Arc::clone(&store));

        assert_eq!(
            lookup.get_by_id("a1").await,
            LookupOutcome::HitStore(sample_order("a1"))
        );
        assert!(cache.get("a1").is_some());
        assert_eq!(
            lookup.get_by_id("a1").await,
            LookupOutcome::HitCache(sample_order("a1"))
        );
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn write_back_never_replaces_a_newer_ingested_order() {
        let store = Arc::new(InMemoryOrderStore::with_orders([sample_order("a1")]));
        store.set_return_delay(Duration::from_millis(200));
        let (lookup, cache) = lookup_with(Arc::clone(&store));

        let in_flight = tokio::spawn({
            let lookup = lookup.clone();
            async move { lookup.get_by_id("a1").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Ingestion writes a newer version while the read above holds the old snapshot.
        let mut newer = sample_order("a1");
        newer.track_number = "V2".to_string();
        store.create(&newer).await.unwrap();
        cache.set(newer.clone());

        let outcome = in_flight.await.unwrap();

        assert_eq!(outcome, LookupOutcome::HitStore(newer.clone()));
        assert_eq!(cache.get("a1"), Some(newer.clone()));
        assert_eq!(store.get("a1"), Some(newer));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (lookup, cache) = lookup_with(Arc::new(InMemoryOrderStore::new()));

        assert_eq!(lookup.get_by_id("nope").await, LookupOutcome::NotFound);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn store_error_is_reported_and_not_cached() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.create(&sample_order("a1")).await.unwrap();
        store.fail_reads(true);
        let (lookup, cache) = lookup_with(store);

        let outcome = lookup.get_by_id("a1").await;

        assert!(matches!(outcome, LookupOutcome::StoreFailure(_)));
        assert_eq!(outcome.label(), "store_failure");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn snapshot_lists_cached_orders() {
        let (lookup, cache) = lookup_with(Arc::new(InMemoryOrderStore::new()));
        cache.set(sample_order("a1"));
        cache.set(sample_order("a2"));

        let mut ids: Vec<String> = lookup.snapshot().into_iter().map(|o| o.order_uid).collect();
        ids.sort();
        assert_eq!(ids, vec!["a1".to_string(), "a2".to_string()]);
    }
}
