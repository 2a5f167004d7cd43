//! `PostgreSQL` order store for the order stream service.
//!
//! This crate provides the production implementations of two capabilities from
//! `order-stream-core`:
//!
//! - [`PostgresOrderStore`]: the [`OrderStore`](order_stream_core::OrderStore), writing each
//!   order and its delivery, payment and items in one transaction
//! - [`PostgresFailureSink`]: a dead letter table for messages the ingestion loop skipped
//!
//! The schema ships as embedded `sqlx` migrations, applied with
//! [`PostgresOrderStore::migrate`].
//!
//! # Example
//!
//! ```ignore
//! use order_stream_postgres::{PostgresFailureSink, PostgresOrderStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresOrderStore::new("postgres://localhost/orders").await?;
//!     store.migrate().await?;
//!     let sink = PostgresFailureSink::new(store.pool().clone());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

/// Dead letter table for skipped messages
pub mod dead_letter_queue;

/// The order store
pub mod store;

pub use dead_letter_queue::{DeadLetter, DeadLetterStatus, PostgresFailureSink};
pub use store::{PoolConfig, PostgresOrderStore};
