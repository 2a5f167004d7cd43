//! # Order Stream Testing
//!
//! Testing utilities for the order stream pipeline.
//!
//! This crate provides:
//! - [`InMemoryOrderStore`]: `HashMap`-backed store with failure and latency injection
//! - [`InMemoryMessageSource`]: queue-backed stream that records commits
//! - [`RecordingFailureSink`]: captures skipped messages
//! - [`fixtures`]: ready-made orders and payloads
//!
//! ## Example
//!
//! ```ignore
//! use order_stream_testing::{InMemoryMessageSource, InMemoryOrderStore, fixtures::sample_order};
//!
//! #[tokio::test]
//! async fn test_ingest() {
//!     let source = Arc::new(InMemoryMessageSource::new("orders"));
//!     let store = Arc::new(InMemoryOrderStore::new());
//!     source.push_order(&sample_order("a1"));
//!
//!     let handle = IngestionLoop::new(source.clone(), store.clone(), cache).start();
//!     assert!(source.wait_for_commits(1, Duration::from_secs(1)).await);
//!     assert!(store.get("a1").is_some());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;

/// In-memory message source and failure sink
pub mod source_mocks;

/// In-memory order store
pub mod store_mocks;

pub use source_mocks::{InMemoryMessageSource, RecordingFailureSink};
pub use store_mocks::InMemoryOrderStore;
