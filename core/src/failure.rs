//! Where skipped messages go.
//!
//! The ingestion loop never stalls on a bad message: it logs, acknowledges and moves on.
//! A [`FailureSink`] keeps a copy of what was skipped so it can be inspected or replayed.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// The pipeline stage at which a message was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// The payload did not decode.
    Decode,
    /// The decoded order failed validation.
    Validation,
    /// The store refused the order.
    Store,
}

impl FailureStage {
    /// Stable lowercase name, used as a column value and a metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that the ingestion loop skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedMessage {
    /// Topic the message came from.
    pub topic: String,
    /// Partition it came from.
    pub partition: i32,
    /// Its offset.
    pub offset: i64,
    /// The order id, when decoding got far enough to learn it.
    pub order_uid: Option<String>,
    /// The unmodified payload.
    pub payload: Vec<u8>,
    /// Where processing stopped.
    pub stage: FailureStage,
    /// Error message.
    pub error: String,
    /// When the failure happened.
    pub failed_at: DateTime<Utc>,
}

/// Errors from recording a failed message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureSinkError {
    /// The sink's backing storage rejected the write.
    #[error("Failed to record message: {0}")]
    Write(String),
}

/// Destination for messages the ingestion loop gave up on.
///
/// Recording is best effort: the loop logs a sink error and carries on.
pub trait FailureSink: Send + Sync {
    /// Record one failed message.
    ///
    /// # Errors
    ///
    /// Returns [`FailureSinkError::Write`] if the record could not be stored.
    fn record(
        &self,
        failed: FailedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), FailureSinkError>> + Send + '_>>;
}
