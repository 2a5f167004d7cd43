//! Order ingestion and lookup service.
//!
//! Wires the pipeline together: orders arrive on a Kafka topic, are written to `PostgreSQL`,
//! mirrored into an in-memory cache and served over HTTP.
//!
//! - [`config`]: environment-driven configuration
//! - [`app`]: startup, serving and graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]

pub mod app;
pub mod config;

pub use app::Application;
pub use config::{Config, ConfigError, FileValues};
