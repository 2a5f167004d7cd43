//! Application lifecycle and graceful shutdown.
//!
//! 1. **Startup**: restore the cache from the store; startup fails if this does
//! 2. **Runtime**: run the ingestion loop in the background and serve HTTP
//! 3. **Shutdown**: on Ctrl+C or SIGTERM stop accepting requests, stop the ingestion loop, wait
//!    for it with the shutdown timeout, close the database pool
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let app = Application::build(config).await?;
//! app.run().await?;
//! ```

use crate::config::Config;
use anyhow::Context;
use order_stream_core::{FailureSink, MessageSource, OrderStore};
use order_stream_postgres::{PoolConfig, PostgresFailureSink, PostgresOrderStore};
use order_stream_redpanda::KafkaOrderSource;
use order_stream_runtime::metrics::MetricsServer;
use order_stream_runtime::{IngestionLoop, OrderCache, OrderLookup, restore_cache};
use order_stream_web::{AppState, build_router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Fully wired service, ready to run.
pub struct Application {
    config: Config,
    listener: TcpListener,
    store: Arc<dyn OrderStore>,
    source: Arc<dyn MessageSource>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    metrics: Option<Arc<MetricsServer>>,
    postgres: Option<PostgresOrderStore>,
}

impl Application {
    /// Connect to `PostgreSQL` and Kafka, run migrations and bind the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns error if any dependency cannot be reached or the listener cannot be bound.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        info!(database = %config.database.redacted_url(), "Connecting to PostgreSQL");
        let pool_config = PoolConfig {
            max_connections: config.database.max_connections,
            min_connections: config.database.min_connections,
            acquire_timeout: config.database.connect_timeout,
        };
        let postgres =
            PostgresOrderStore::connect_with(config.database.connect_options()?, &pool_config)
                .await
                .context("Failed to connect to PostgreSQL")?;
        postgres
            .migrate()
            .await
            .context("Failed to run database migrations")?;

        info!(
            brokers = %config.kafka.brokers,
            topic = %config.kafka.topic,
            group_id = %config.kafka.group_id,
            "Subscribing to Kafka"
        );
        let source = KafkaOrderSource::builder()
            .brokers(&config.kafka.brokers)
            .topic(&config.kafka.topic)
            .group_id(&config.kafka.group_id)
            .auto_offset_reset(&config.kafka.auto_offset_reset)
            .fetch_min_bytes(config.kafka.min_bytes)
            .fetch_max_bytes(config.kafka.max_bytes)
            .build()
            .context("Failed to create Kafka consumer")?;

        let listener = TcpListener::bind(config.http.bind_address())
            .await
            .with_context(|| format!("Failed to bind {}", config.http.bind_address()))?;

        let mut app = Self::new(
            config,
            listener,
            Arc::new(postgres.clone()),
            Arc::new(source),
        );

        if app.config.ingest.dead_letter {
            info!("Dead letter table enabled");
            app = app.with_failure_sink(Arc::new(PostgresFailureSink::new(
                postgres.pool().clone(),
            )));
        }

        if app.config.metrics.enabled {
            let mut metrics = MetricsServer::new();
            metrics.start().context("Failed to install metrics recorder")?;
            app = app.with_metrics(Arc::new(metrics));
        }

        app.postgres = Some(postgres);
        Ok(app)
    }

    /// Wire an application from already constructed parts.
    #[must_use]
    pub fn new(
        config: Config,
        listener: TcpListener,
        store: Arc<dyn OrderStore>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        Self {
            config,
            listener,
            store,
            source,
            failure_sink: None,
            metrics: None,
            postgres: None,
        }
    }

    /// Hand skipped messages to `sink`.
    #[must_use]
    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// Serve `/metrics` from `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// See [`run_until`](Self::run_until).
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns error if the cache cannot be restored or the HTTP server fails.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = self
            .listener
            .local_addr()
            .context("Failed to read listener address")?;
        let cache = Arc::new(OrderCache::new());

        if let Err(e) = restore_cache(
            &cache,
            self.store.as_ref(),
            self.config.cache.restore_timeout,
        )
        .await
        {
            if let Err(close_err) = self.source.close().await {
                warn!(error = %close_err, "Failed to close message source");
            }
            self.close_pool().await;
            return Err(e).context("Failed to restore cache from store");
        }

        let mut ingestion = IngestionLoop::new(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&cache),
        )
        .with_fetch_timeout(self.config.kafka.fetch_timeout)
        .with_retry_delay(self.config.ingest.retry_delay);
        if let Some(sink) = &self.failure_sink {
            ingestion = ingestion.with_failure_sink(Arc::clone(sink));
        }
        let ingestion = ingestion.start();

        let lookup = OrderLookup::new(cache, Arc::clone(&self.store));
        let mut state = AppState::new(lookup, &self.config.http.static_dir);
        if let Some(metrics) = &self.metrics {
            state = state.with_metrics(Arc::clone(metrics));
        }
        state.mark_ready();
        let router = build_router(state, self.config.http.request_timeout);

        info!(address = %address, "HTTP server listening for requests");
        let served = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        info!("HTTP server stopped, stopping ingestion");
        match ingestion.shutdown(self.config.http.shutdown_timeout).await {
            Ok(()) => info!("Ingestion loop stopped gracefully"),
            Err(e) => warn!(error = %e, "Ingestion loop did not stop cleanly"),
        }

        if let Some(postgres) = &self.postgres {
            postgres.close().await;
            info!("Database pool closed");
        }

        served.context("HTTP server failed")?;
        info!("Graceful shutdown complete");
        Ok(())
    }

    async fn close_pool(&self) {
        if let Some(postgres) = &self.postgres {
            postgres.close().await;
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed, that signal is ignored and the other one still works.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
