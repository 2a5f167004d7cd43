//! The ingestion loop.
//!
//! [`IngestionLoop`] turns stream messages into stored, cached orders. Each message goes
//! through the same steps, strictly one at a time:
//!
//! 1. decode the payload into an [`Order`](order_stream_core::Order)
//! 2. validate it
//! 3. write it through the [`OrderStore`]
//! 4. on success, mirror it into the [`OrderCache`]
//! 5. acknowledge the message, whatever happened above
//!
//! A message that fails steps 1 to 3 is logged, optionally handed to a [`FailureSink`], and
//! acknowledged anyway, so one bad message never blocks the ones behind it.
//!
//! # Lifecycle
//!
//! ```text
//! Running ──stop()──▶ Stopping ──(current cycle ends)──▶ Stopped
//! ```
//!
//! Stopping is cooperative: a message that is already being processed is finished and
//! acknowledged first. Once the loop exits it closes the source.

use crate::cache::OrderCache;
use crate::metrics::IngestMetrics;
use chrono::Utc;
use order_stream_core::{
    DecodeError, FailedMessage, FailureSink, FailureStage, Fetch, MessageSource, OrderStore,
    RawMessage, StoreError, ValidationError, decode_order,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default time a single fetch waits before reporting the source idle.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(1);

/// Default back-off after the source fails to fetch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Why a message was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The payload is not a valid order document.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The order decoded but is structurally invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store rejected the order.
    #[error("Failed to store order {order_uid}: {source}")]
    Store {
        /// The order that could not be stored.
        order_uid: String,
        /// Underlying store error.
        source: StoreError,
    },
}

impl IngestError {
    /// Stable outcome label for metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Validation(_) => "validation_error",
            Self::Store { .. } => "store_error",
        }
    }

    /// The stage at which processing stopped.
    #[must_use]
    pub const fn stage(&self) -> FailureStage {
        match self {
            Self::Decode(_) => FailureStage::Decode,
            Self::Validation(_) => FailureStage::Validation,
            Self::Store { .. } => FailureStage::Store,
        }
    }

    /// The order id, when processing got far enough to learn a usable one.
    #[must_use]
    pub fn order_uid(&self) -> Option<&str> {
        match self {
            Self::Store { order_uid, .. } => Some(order_uid),
            Self::Decode(_) | Self::Validation(_) => None,
        }
    }
}

/// Errors from shutting the loop down.
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// The loop did not reach `Stopped` in time.
    #[error("Ingestion loop did not stop within {0:?}")]
    Timeout(Duration),

    /// The loop task panicked or was aborted.
    #[error("Ingestion task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Observable state of a running loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Fetching and processing messages.
    Running,
    /// Stop requested; finishing the current cycle.
    Stopping,
    /// Exited and source closed. Terminal.
    Stopped,
}

/// Consumes a [`MessageSource`] into an [`OrderStore`] and an [`OrderCache`].
///
/// # Example
///
/// ```ignore
/// let handle = IngestionLoop::new(source, store, cache)
///     .with_failure_sink(sink)
///     .with_fetch_timeout(Duration::from_millis(500))
///     .start();
///
/// // ...
/// handle.shutdown(Duration::from_secs(30)).await?;
/// ```
pub struct IngestionLoop {
    source: Arc<dyn MessageSource>,
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    fetch_timeout: Duration,
    retry_delay: Duration,
}

impl IngestionLoop {
    /// Create a loop with default timeouts and no failure sink.
    #[must_use]
    pub fn new(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn OrderStore>,
        cache: Arc<OrderCache>,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            failure_sink: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Hand skipped messages to `sink` before acknowledging them.
    #[must_use]
    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// How long one fetch waits for a message. Also bounds how quickly a stop is noticed.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// How long to back off after a fetch error.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the loop on the current tokio runtime.
    #[must_use]
    pub fn start(self) -> IngestHandle {
        let (state_tx, _) = watch::channel(LoopState::Running);
        let state = Arc::new(state_tx);
        let source = Arc::clone(&self.source);
        let task = tokio::spawn(self.run(Arc::clone(&state)));
        IngestHandle {
            state,
            source,
            task,
        }
    }

    /// Run until the state leaves `Running`, then close the source and publish `Stopped`.
    async fn run(self, state: Arc<watch::Sender<LoopState>>) {
        tracing::info!(
            fetch_timeout_ms = self.fetch_timeout.as_millis(),
            dead_letter = self.failure_sink.is_some(),
            "Ingestion loop started"
        );
        let mut state_rx = state.subscribe();

        while *state_rx.borrow_and_update() == LoopState::Running {
            let fetched = tokio::select! {
                biased;
                _ = state_rx.changed() => continue,
                fetched = self.source.fetch_next(self.fetch_timeout) => fetched,
            };

            match fetched {
                Ok(Fetch::Message(message)) => self.handle(message).await,
                Ok(Fetch::Idle) => {}
                Ok(Fetch::Closed) => {
                    tracing::info!("Message source closed");
                    break;
                }
                Err(e) => {
                    IngestMetrics::record_fetch_error();
                    tracing::error!(error = %e, "Failed to fetch message");
                    tokio::select! {
                        _ = state_rx.changed() => {}
                        () = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.source.close().await {
            tracing::warn!(error = %e, "Failed to close message source");
        }
        state.send_replace(LoopState::Stopped);
        tracing::info!("Ingestion loop stopped");
    }

    /// Process one message and acknowledge it.
    async fn handle(&self, message: RawMessage) {
        let started = Instant::now();
        let result = self.process(&message).await;
        let outcome = result.as_ref().map_or_else(IngestError::outcome, |_| "stored");
        IngestMetrics::record_message(outcome, started.elapsed());

        if let Err(e) = result {
            tracing::warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                outcome,
                error = %e,
                "Skipping message"
            );
            self.record_failure(&message, &e).await;
        }

        if let Err(e) = self.source.commit(&message).await {
            IngestMetrics::record_commit_error();
            tracing::error!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit message"
            );
        }
    }

    /// Decode, validate, store and cache one message. Does not acknowledge it.
    ///
    /// The cache is only written after the store accepted the order.
    ///
    /// # Errors
    ///
    /// Returns the [`IngestError`] describing why the message was not stored.
    pub async fn process(&self, message: &RawMessage) -> Result<(), IngestError> {
        let order = decode_order(&message.payload)?;
        order.validate()?;

        if order.has_no_items() {
            tracing::warn!(order_uid = %order.order_uid, "Order has no items");
        }

        self.store
            .create(&order)
            .await
            .map_err(|source| IngestError::Store {
                order_uid: order.order_uid.clone(),
                source,
            })?;

        tracing::info!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            partition = message.partition,
            offset = message.offset,
            "Order stored"
        );
        self.cache.set(order);
        Ok(())
    }

    async fn record_failure(&self, message: &RawMessage, error: &IngestError) {
        let Some(sink) = &self.failure_sink else {
            return;
        };

        let failed = FailedMessage {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            order_uid: error.order_uid().map(str::to_owned),
            payload: message.payload.clone(),
            stage: error.stage(),
            error: error.to_string(),
            failed_at: Utc::now(),
        };

        if let Err(e) = sink.record(failed).await {
            tracing::error!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to record skipped message"
            );
        }
    }
}

/// Control handle for a spawned [`IngestionLoop`].
pub struct IngestHandle {
    state: Arc<watch::Sender<LoopState>>,
    source: Arc<dyn MessageSource>,
    task: JoinHandle<()>,
}

impl IngestHandle {
    /// Request a stop. Idempotent; has no effect once the loop is stopping or stopped.
    pub fn stop(&self) {
        self.state.send_if_modified(|state| {
            if *state == LoopState::Running {
                *state = LoopState::Stopping;
                true
            } else {
                false
            }
        });
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Stop the loop and wait up to `timeout` for it to exit.
    ///
    /// # Errors
    ///
    /// - [`ShutdownError::Timeout`]: the loop is still running after `timeout`. It is aborted,
    ///   the source is closed and the state becomes `Stopped`. The message it was processing
    ///   is not acknowledged and will be redelivered.
    /// - [`ShutdownError::TaskFailed`]: the loop task panicked
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ShutdownError> {
        self.stop();
        let abort = self.task.abort_handle();

        if let Ok(joined) = tokio::time::timeout(timeout, self.task).await {
            joined?;
            return Ok(());
        }

        abort.abort();
        tracing::warn!(timeout = ?timeout, "Ingestion loop aborted after shutdown timeout");
        if let Err(e) = self.source.close().await {
            tracing::warn!(error = %e, "Failed to close message source");
        }
        self.state.send_replace(LoopState::Stopped);
        Err(ShutdownError::Timeout(timeout))
    }
}
