//! # Order Stream Runtime
//!
//! The moving parts of the order pipeline, built on the capability traits from
//! `order-stream-core`.
//!
//! ## Core Components
//!
//! - **Cache** ([`OrderCache`]): concurrent in-memory mirror of the store
//! - **Ingestion** ([`IngestionLoop`]): stream → decode → validate → store → cache → commit
//! - **Lookup** ([`OrderLookup`]): cache first, store on miss, write back
//! - **Bootstrap** ([`restore_cache`]): warms the cache before the service accepts lookups
//! - **Metrics** ([`metrics::MetricsServer`]): Prometheus recorder and metric helpers
//!
//! ## Example
//!
//! ```ignore
//! use order_stream_runtime::{IngestionLoop, OrderCache, OrderLookup, restore_cache};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(OrderCache::new());
//! restore_cache(&cache, store.as_ref(), Duration::from_secs(10)).await?;
//!
//! let ingest = IngestionLoop::new(source, Arc::clone(&store), Arc::clone(&cache)).start();
//! let lookup = OrderLookup::new(cache, store);
//!
//! match lookup.get_by_id("b563feb7b2b84b6test").await {
//!     LookupOutcome::HitCache(order) | LookupOutcome::HitStore(order) => { /* ... */ }
//!     LookupOutcome::NotFound => { /* ... */ }
//!     LookupOutcome::StoreFailure(e) => { /* ... */ }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Startup cache warm-up
pub mod bootstrap;

/// In-memory order cache
pub mod cache;

/// The ingestion loop
pub mod ingest;

/// Cache-first lookup
pub mod lookup;

/// Prometheus metrics for observability
pub mod metrics;

pub use bootstrap::{DEFAULT_RESTORE_DEADLINE, restore_cache};
pub use cache::{OrderCache, RestoreError};
pub use ingest::{IngestError, IngestHandle, IngestionLoop, LoopState, ShutdownError};
pub use lookup::{LookupOutcome, OrderLookup};
