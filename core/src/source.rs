//! The inbound message stream.
//!
//! A [`MessageSource`] hands out raw messages one at a time and accepts acknowledgements for
//! them. Acknowledging a message advances the consumer group's position past it; messages
//! that were fetched but never acknowledged are redelivered after a restart.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// A message as it came off the stream, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Optional message key.
    pub key: Option<Vec<u8>>,
    /// Message body. Expected to be a JSON-encoded order.
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Build a message with no key.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload,
        }
    }
}

/// Result of asking the source for its next message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetch {
    /// A message is available.
    Message(RawMessage),
    /// No message arrived before the fetch deadline. The caller should check for
    /// cancellation and try again.
    Idle,
    /// The source has been closed and will never yield another message.
    Closed,
}

/// Errors that can occur while talking to the stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Fetching from the broker failed. Usually transient.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Acknowledging a message failed.
    #[error("Commit error: {0}")]
    Commit(String),

    /// The source was configured incorrectly and cannot be used.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A stream of order messages with at-least-once delivery.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so sources can be swapped behind
/// `Arc<dyn MessageSource>`.
pub trait MessageSource: Send + Sync {
    /// Wait up to `deadline` for the next message.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the broker could not be read.
    fn fetch_next(
        &self,
        deadline: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Fetch, SourceError>> + Send + '_>>;

    /// Acknowledge a message so it is not redelivered to this consumer group.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Commit`] if the acknowledgement was not accepted.
    fn commit<'a>(
        &'a self,
        message: &'a RawMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + 'a>>;

    /// Release the connection. Later fetches return [`Fetch::Closed`].
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the broker connection could not be shut down
    /// cleanly.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>>;
}
