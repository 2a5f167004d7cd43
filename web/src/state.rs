//! Application state for Axum handlers.

use order_stream_runtime::OrderLookup;
use order_stream_runtime::metrics::MetricsServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is cheap to clone and clones share the same cache,
/// store and readiness flag.
#[derive(Clone)]
pub struct AppState {
    /// Cache-first lookup over the order store
    pub lookup: OrderLookup,

    /// Prometheus recorder owner, `None` when metrics are disabled
    pub metrics: Option<Arc<MetricsServer>>,

    /// Directory holding `index.html` and the static assets
    pub static_dir: PathBuf,

    ready: Arc<AtomicBool>,
}

impl AppState {
    /// Create a new application state. The service starts out not ready.
    #[must_use]
    pub fn new(lookup: OrderLookup, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            lookup,
            metrics: None,
            static_dir: static_dir.into(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serve metrics from the given server.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flag the service as ready once the cache has been restored.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Whether [`mark_ready`](Self::mark_ready) has been called.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Path of the lookup page.
    #[must_use]
    pub fn index_file(&self) -> PathBuf {
        self.static_dir.join("index.html")
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("lookup", &self.lookup)
            .field("metrics_enabled", &self.metrics.is_some())
            .field("static_dir", &self.static_dir)
            .field("ready", &self.is_ready())
            .finish()
    }
}
