//! # Order Stream Core
//!
//! Core types and capability traits for the order ingestion-and-lookup pipeline.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Order model**: [`Order`] and its owned [`Delivery`], [`Payment`] and [`Item`] records
//! - **Codec**: decoding inbound payloads and structural validation
//! - **Capabilities**: [`OrderStore`] (durable persistence), [`MessageSource`] (the inbound
//!   stream) and [`FailureSink`] (where skipped messages go)
//! - **Error taxonomy**: one `thiserror` enum per capability
//!
//! ## Data Flow
//!
//! ```text
//! stream ──▶ decode/validate ──▶ OrderStore::create ──▶ cache
//!                                        ▲
//! lookup ──▶ cache ──(miss)──▶ OrderStore::find_one ──▶ cache (write-back)
//! ```
//!
//! The runtime crate owns the cache, the ingestion loop and the lookup service;
//! persistence and messaging technologies implement the traits defined here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod failure;
pub mod order;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use codec::{DecodeError, ValidationError, decode_order, encode_order};
pub use failure::{FailedMessage, FailureSink, FailureSinkError, FailureStage};
pub use order::{Delivery, Item, Order, Payment};
pub use source::{Fetch, MessageSource, RawMessage, SourceError};
pub use store::{OrderStore, StoreError};
