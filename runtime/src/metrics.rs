//! Prometheus metrics for the ingestion and lookup pipeline.
//!
//! Metrics are recorded through the `metrics` facade from anywhere in the runtime. Nothing is
//! exported until [`MetricsServer::start`] installs the Prometheus recorder; the HTTP layer
//! then serves [`MetricsServer::render`] at `/metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use order_stream_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder owner.
///
/// Holds the handle used to render the current metric values in the Prometheus text format.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a server with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one recorder can be installed per process. If one already is (e.g., in tests),
    /// this logs a warning and leaves [`render`](Self::render) returning `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder isn't installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Ingestion
    describe_counter!(
        "ingest_messages_total",
        "Messages handled by the ingestion loop, labelled by outcome"
    );
    describe_histogram!(
        "ingest_process_duration_seconds",
        "Time taken to decode, validate, store and cache one message"
    );
    describe_counter!(
        "ingest_fetch_errors_total",
        "Errors returned by the message source while fetching"
    );
    describe_counter!(
        "ingest_commit_errors_total",
        "Errors returned by the message source while committing"
    );

    // Lookup
    describe_counter!(
        "lookup_requests_total",
        "Order lookups, labelled by outcome"
    );

    // Cache
    describe_gauge!("cache_entries", "Number of orders held in the cache");
    describe_histogram!(
        "cache_restore_duration_seconds",
        "Time taken to load the cache from the store at startup"
    );
}

/// Ingestion loop metrics recorder.
pub struct IngestMetrics;

impl IngestMetrics {
    /// Record one processed message.
    ///
    /// `outcome` is one of `stored`, `decode_error`, `validation_error`, `store_error`.
    pub fn record_message(outcome: &'static str, duration: Duration) {
        counter!("ingest_messages_total", "outcome" => outcome).increment(1);
        histogram!("ingest_process_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a fetch error.
    pub fn record_fetch_error() {
        counter!("ingest_fetch_errors_total").increment(1);
    }

    /// Record a commit error.
    pub fn record_commit_error() {
        counter!("ingest_commit_errors_total").increment(1);
    }
}

/// Lookup service metrics recorder.
pub struct LookupMetrics;

impl LookupMetrics {
    /// Record a lookup outcome (`hit_cache`, `hit_store`, `not_found`, `store_failure`).
    pub fn record(outcome: &'static str) {
        counter!("lookup_requests_total", "outcome" => outcome).increment(1);
    }
}

/// Cache metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record the current number of entries.
    #[allow(clippy::cast_precision_loss)] // entry counts stay far below 2^52
    pub fn record_size(entries: usize) {
        gauge!("cache_entries").set(entries as f64);
    }

    /// Record how long a bulk restore took.
    pub fn record_restore(duration: Duration) {
        histogram!("cache_restore_duration_seconds").record(duration.as_secs_f64());
    }
}
