//! Durable order persistence.
//!
//! [`OrderStore`] is the system of record. The in-memory cache in the runtime crate is only
//! an accelerator over it: everything the cache holds was written here first.
//!
//! # Implementations
//!
//! - `PostgresOrderStore` (in `order-stream-postgres`): production implementation
//! - `InMemoryOrderStore` (in `order-stream-testing`): fast, deterministic testing

use crate::order::Order;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during order store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (connection refused, pool exhausted, timed out).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A query failed inside the database.
    #[error("Database error: {0}")]
    Database(String),

    /// A write violated a schema constraint.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The order row exists but one of its owned records is missing.
    #[error("Order {order_uid} is incomplete: {reason}")]
    Incomplete {
        /// The order that could not be assembled.
        order_uid: String,
        /// Which part is missing.
        reason: String,
    },
}

/// Durable storage for orders and their owned records.
///
/// # Contract
///
/// - `create` is atomic: the order, its delivery, its payment and all of its items become
///   visible together or not at all.
/// - Creating an order whose `order_uid` already exists replaces the stored aggregate,
///   including its item list. Redelivered messages are therefore harmless.
/// - `find_one` returns `Ok(None)` for an unknown id; absence is not an error.
/// - Items come back in the order they were written.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the store can be shared as
/// `Arc<dyn OrderStore>` between the ingestion loop and the lookup service.
pub trait OrderStore: Send + Sync {
    /// Persist an order and all of its owned records in one transaction.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the store could not be reached
    /// - `Constraint`: a schema constraint rejected the write
    /// - `Database`: any other failure; the transaction is rolled back
    fn create<'a>(
        &'a self,
        order: &'a Order,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

    /// Load one fully assembled order by id.
    ///
    /// # Errors
    ///
    /// - `Incomplete`: the order row exists but its delivery or payment is missing
    /// - `Unavailable` / `Database`: the read failed
    fn find_one<'a>(
        &'a self,
        order_uid: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Order>, StoreError>> + Send + 'a>>;

    /// Load every stored order, fully assembled.
    ///
    /// Used to warm the cache at startup.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any order cannot be loaded or assembled.
    fn find_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Order>, StoreError>> + Send + '_>>;

    /// List the ids of every stored order.
    ///
    /// Cheaper than [`find_all`](Self::find_all).
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Database`: the read failed
    fn find_all_ids(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, StoreError>> + Send + '_>>;

    /// Count stored orders without loading them. Used by readiness checks.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Database`: the read failed
    fn count(&self) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + '_>>;
}
