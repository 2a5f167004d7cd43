//! Redpanda / Kafka message source for the order stream service.
//!
//! This crate implements the [`MessageSource`] trait from `order-stream-core` on top of
//! rdkafka, so the ingestion loop can read orders from any Kafka-compatible broker
//! (Redpanda, Apache Kafka, MSK, ...).
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Auto-commit is disabled; the ingestion loop acknowledges each message once it is done
//!   with it
//! - A commit stores `offset + 1` for the message's partition, so the group resumes after it
//! - If the process stops before a commit, the message is redelivered to the group
//! - Ordering is guaranteed within a partition only
//!
//! # Example
//!
//! ```no_run
//! use order_stream_core::{Fetch, MessageSource};
//! use order_stream_redpanda::KafkaOrderSource;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = KafkaOrderSource::builder()
//!     .brokers("localhost:9092")
//!     .topic("orders")
//!     .group_id("orders-service-group")
//!     .build()?;
//!
//! if let Fetch::Message(message) = source.fetch_next(Duration::from_secs(1)).await? {
//!     println!("offset {}", message.offset);
//!     source.commit(&message).await?;
//! }
//! source.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use order_stream_core::{Fetch, MessageSource, RawMessage, SourceError};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default minimum bytes the broker accumulates before answering a fetch.
pub const DEFAULT_FETCH_MIN_BYTES: u32 = 10_000;

/// Default maximum bytes returned by one fetch.
pub const DEFAULT_FETCH_MAX_BYTES: u32 = 10_000_000;

/// Kafka consumer-group reader for a single order topic.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Topic**: The order topic (required)
/// - **Consumer group**: Default `orders-service-group`
/// - **Offset reset**: Where a new group starts reading (default: "earliest")
/// - **Fetch sizing**: `fetch.min.bytes` / `fetch.max.bytes`
///
/// After [`close`](MessageSource::close) the consumer is unsubscribed and dropped, and every
/// later fetch returns [`Fetch::Closed`].
pub struct KafkaOrderSource {
    consumer: RwLock<Option<StreamConsumer>>,
    topic: String,
    group_id: String,
}

impl KafkaOrderSource {
    /// Create a new builder for configuring the source.
    #[must_use]
    pub fn builder() -> KafkaOrderSourceBuilder {
        KafkaOrderSourceBuilder::default()
    }

    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The consumer group.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

fn to_raw_message(message: &BorrowedMessage<'_>) -> RawMessage {
    RawMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

impl MessageSource for KafkaOrderSource {
    fn fetch_next(
        &self,
        deadline: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Fetch, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let guard = self.consumer.read().await;
            let Some(consumer) = guard.as_ref() else {
                return Ok(Fetch::Closed);
            };

            match tokio::time::timeout(deadline, consumer.recv()).await {
                Ok(Ok(message)) => {
                    tracing::debug!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );
                    Ok(Fetch::Message(to_raw_message(&message)))
                }
                Ok(Err(e)) => Err(SourceError::Transport(e.to_string())),
                Err(_) => Ok(Fetch::Idle),
            }
        })
    }

    fn commit<'a>(
        &'a self,
        message: &'a RawMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let guard = self.consumer.read().await;
            let Some(consumer) = guard.as_ref() else {
                return Err(SourceError::Commit("source is closed".to_string()));
            };

            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(
                    &message.topic,
                    message.partition,
                    Offset::Offset(message.offset + 1),
                )
                .map_err(|e| SourceError::Commit(e.to_string()))?;

            consumer
                .commit(&offsets, CommitMode::Async)
                .map_err(|e| SourceError::Commit(e.to_string()))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(consumer) = self.consumer.write().await.take() {
                consumer.unsubscribe();
                tracing::info!(
                    topic = %self.topic,
                    group_id = %self.group_id,
                    "Kafka consumer closed"
                );
            }
            Ok(())
        })
    }
}

/// Builder for configuring a [`KafkaOrderSource`].
///
/// # Example
///
/// ```no_run
/// use order_stream_redpanda::KafkaOrderSource;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = KafkaOrderSource::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .topic("orders")
///     .auto_offset_reset("latest")
///     .session_timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct KafkaOrderSourceBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    group_id: Option<String>,
    auto_offset_reset: Option<String>,
    fetch_min_bytes: Option<u32>,
    fetch_max_bytes: Option<u32>,
    session_timeout: Option<Duration>,
}

impl KafkaOrderSourceBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the topic to read orders from.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the consumer group.
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set where a group without committed offsets starts: `earliest` or `latest`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set `fetch.min.bytes`.
    #[must_use]
    pub const fn fetch_min_bytes(mut self, bytes: u32) -> Self {
        self.fetch_min_bytes = Some(bytes);
        self
    }

    /// Set `fetch.max.bytes`.
    #[must_use]
    pub const fn fetch_max_bytes(mut self, bytes: u32) -> Self {
        self.fetch_max_bytes = Some(bytes);
        self
    }

    /// Set the group session timeout.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Build the client configuration without creating a consumer.
    fn client_config(&self) -> Result<(ClientConfig, String, String), SourceError> {
        let brokers = self
            .brokers
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| SourceError::Configuration("Brokers not configured".to_string()))?;
        let topic = self
            .topic
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SourceError::Configuration("Topic not configured".to_string()))?;
        let group_id = self
            .group_id
            .clone()
            .unwrap_or_else(|| "orders-service-group".to_string());
        let auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("earliest");
        if !matches!(auto_offset_reset, "earliest" | "latest") {
            return Err(SourceError::Configuration(format!(
                "Invalid auto.offset.reset: {auto_offset_reset}"
            )));
        }

        let min_bytes = self.fetch_min_bytes.unwrap_or(DEFAULT_FETCH_MIN_BYTES);
        let max_bytes = self.fetch_max_bytes.unwrap_or(DEFAULT_FETCH_MAX_BYTES);
        if min_bytes > max_bytes {
            return Err(SourceError::Configuration(format!(
                "fetch.min.bytes ({min_bytes}) exceeds fetch.max.bytes ({max_bytes})"
            )));
        }
        let session_timeout = self.session_timeout.unwrap_or(Duration::from_secs(10));

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false") // Manual commit for at-least-once
            .set("auto.offset.reset", auto_offset_reset)
            .set("enable.partition.eof", "false")
            .set("fetch.min.bytes", min_bytes.to_string())
            .set("fetch.max.bytes", max_bytes.to_string())
            .set(
                "session.timeout.ms",
                session_timeout.as_millis().to_string(),
            );

        Ok((config, topic.to_string(), group_id))
    }

    /// Create the consumer and subscribe it to the topic.
    ///
    /// Does not wait for the broker; connection problems surface on the first fetch.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] if:
    /// - Brokers or topic not set
    /// - An option is out of range
    /// - The consumer cannot be created or subscribed
    pub fn build(self) -> Result<KafkaOrderSource, SourceError> {
        let (config, topic, group_id) = self.client_config()?;

        let consumer: StreamConsumer = config.create().map_err(|e| {
            SourceError::Configuration(format!("Failed to create consumer: {e}"))
        })?;
        consumer.subscribe(&[topic.as_str()]).map_err(|e| {
            SourceError::Configuration(format!("Failed to subscribe to {topic}: {e}"))
        })?;

        tracing::info!(
            brokers = self.brokers.as_deref().unwrap_or_default(),
            topic = %topic,
            group_id = %group_id,
            manual_commit = true,
            "Kafka order source created"
        );

        Ok(KafkaOrderSource {
            consumer: RwLock::new(Some(consumer)),
            topic,
            group_id,
        })
    }
}
