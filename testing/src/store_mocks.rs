//! In-memory order store with failure injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use order_stream_core::{Order, OrderStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

/// HashMap-backed [`OrderStore`] for fast, deterministic tests.
///
/// Behaves like the production store (creating an existing id replaces it, absence is
/// `Ok(None)`) and can be told to fail or stall.
///
/// # Example
///
/// ```
/// use order_stream_core::OrderStore;
/// use order_stream_testing::{InMemoryOrderStore, fixtures::sample_order};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryOrderStore::new();
/// store.create(&sample_order("a1")).await?;
///
/// assert!(store.find_one("a1").await?.is_some());
/// assert_eq!(store.create_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
    failing_creates: Arc<RwLock<HashSet<String>>>,
    fail_reads: Arc<AtomicBool>,
    read_delay: Arc<RwLock<Option<Duration>>>,
    return_delay: Arc<RwLock<Option<Duration>>>,
    create_gate: Arc<RwLock<Option<Arc<Notify>>>>,
    held_creates: Arc<AtomicUsize>,
    bulk_reads: Arc<AtomicUsize>,
    creates: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `orders`.
    #[must_use]
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut map = store.orders.write().unwrap();
            for order in orders {
                map.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    /// Make every `create` for `order_uid` fail with [`StoreError::Database`].
    pub fn fail_creates_for(&self, order_uid: &str) {
        self.failing_creates
            .write()
            .unwrap()
            .insert(order_uid.to_string());
    }

    /// Make every read (`find_one`, `find_all`, `find_all_ids`, `count`) fail with
    /// [`StoreError::Unavailable`].
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Delay every read by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.write().unwrap() = Some(delay);
    }

    /// Make `find_one` take its snapshot first and then wait `delay` before returning it.
    ///
    /// Lets a test change the store (and the cache) while a stale read is in flight.
    pub fn set_return_delay(&self, delay: Duration) {
        *self.return_delay.write().unwrap() = Some(delay);
    }

    /// Hold every `create` until `gate` is notified, once per create.
    pub fn gate_creates(&self, gate: Arc<Notify>) {
        *self.create_gate.write().unwrap() = Some(gate);
    }

    /// Number of `create` calls currently waiting at the gate.
    #[must_use]
    pub fn held_creates(&self) -> usize {
        self.held_creates.load(Ordering::SeqCst)
    }

    /// Direct access to a stored order, bypassing counters and failure injection.
    #[must_use]
    pub fn get(&self, order_uid: &str) -> Option<Order> {
        self.orders.read().unwrap().get(order_uid).cloned()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().unwrap().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().unwrap().is_empty()
    }

    /// Number of successful `create` calls.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `find_one` calls, including failed ones.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `find_all` and `find_all_ids` calls, including failed ones.
    #[must_use]
    pub fn bulk_read_count(&self) -> usize {
        self.bulk_reads.load(Ordering::SeqCst)
    }

    async fn before_read(&self) -> Result<(), StoreError> {
        let delay = *self.read_delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

impl OrderStore for InMemoryOrderStore {
    fn create<'a>(
        &'a self,
        order: &'a Order,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let gate = self.create_gate.read().unwrap().clone();
            if let Some(gate) = gate {
                self.held_creates.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                self.held_creates.fetch_sub(1, Ordering::SeqCst);
            }

            if self
                .failing_creates
                .read()
                .unwrap()
                .contains(&order.order_uid)
            {
                return Err(StoreError::Database(format!(
                    "injected create failure for {}",
                    order.order_uid
                )));
            }

            self.orders
                .write()
                .unwrap()
                .insert(order.order_uid.clone(), order.clone());
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn find_one<'a>(
        &'a self,
        order_uid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Order>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.before_read().await?;
            let snapshot = self.get(order_uid);
            let delay = *self.return_delay.read().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(snapshot)
        })
    }

    fn find_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Order>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.bulk_reads.fetch_add(1, Ordering::SeqCst);
            self.before_read().await?;
            Ok(self.orders.read().unwrap().values().cloned().collect())
        })
    }

    fn find_all_ids(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.bulk_reads.fetch_add(1, Ordering::SeqCst);
            self.before_read().await?;
            Ok(self.orders.read().unwrap().keys().cloned().collect())
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.before_read().await?;
            Ok(self.len())
        })
    }
}
