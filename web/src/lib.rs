//! Axum HTTP layer for the order stream service.
//!
//! Exposes the lookup service over HTTP. Handlers translate [`LookupOutcome`] values into
//! status codes and JSON bodies; everything else (caching, store fallback, write-back) lives in
//! `order-stream-runtime`.
//!
//! # Routes
//!
//! ```text
//! GET /order/:order_uid   order JSON, 404 when unknown, 500 when the store fails
//! GET /orders             every cached order
//! GET /health             liveness
//! GET /ready              readiness (bootstrap done, store reachable)
//! GET /metrics            Prometheus text
//! GET /                   lookup page
//! GET /static/*           static assets
//! ```
//!
//! # Example
//!
//! ```ignore
//! use order_stream_web::{AppState, build_router};
//! use std::time::Duration;
//!
//! let state = AppState::new(lookup, "web/static");
//! state.mark_ready();
//!
//! let app = build_router(state, Duration::from_secs(10));
//! axum::serve(listener, app).await?;
//! ```
//!
//! [`LookupOutcome`]: order_stream_runtime::LookupOutcome

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use router::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
