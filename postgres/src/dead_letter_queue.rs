//! Dead letter table for skipped messages.
//!
//! Keeps a copy of every message the ingestion loop gave up on, with the stage and error that
//! stopped it, so operators can inspect and replay them.

use chrono::{DateTime, Utc};
use order_stream_core::{FailedMessage, FailureSink, FailureSinkError, FailureStage, StoreError};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

use crate::store::map_sqlx_error;

/// Review status of a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterStatus {
    /// Waiting for someone to look at it
    Pending,
    /// Replayed or otherwise fixed
    Resolved,
    /// Permanently dropped
    Discarded,
}

impl DeadLetterStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(StoreError::Database(format!(
                "Invalid dead letter status: {s}"
            ))),
        }
    }
}

fn parse_stage(s: &str) -> Result<FailureStage, StoreError> {
    match s {
        "decode" => Ok(FailureStage::Decode),
        "validation" => Ok(FailureStage::Validation),
        "store" => Ok(FailureStage::Store),
        _ => Err(StoreError::Database(format!("Invalid failure stage: {s}"))),
    }
}

/// A stored dead letter.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Unique identifier for this entry
    pub id: i64,
    /// The skipped message and why it was skipped
    pub message: FailedMessage,
    /// Current review status
    pub status: DeadLetterStatus,
    /// When it was resolved or discarded
    pub resolved_at: Option<DateTime<Utc>>,
    /// What was done about it
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL`-backed [`FailureSink`].
///
/// # Example
///
/// ```no_run
/// use order_stream_postgres::PostgresFailureSink;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let sink = PostgresFailureSink::new(pool);
///
/// let pending = sink.list_pending(100).await?;
/// println!("Pending dead letters: {}", pending.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresFailureSink {
    pool: PgPool,
}

impl PostgresFailureSink {
    /// Create a sink over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a dead letter and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub async fn add_entry(&self, failed: &FailedMessage) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_messages (
                topic, partition_id, message_offset, order_uid, payload, stage,
                error_message, failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(&failed.topic)
        .bind(failed.partition)
        .bind(failed.offset)
        .bind(failed.order_uid.as_deref())
        .bind(&failed.payload)
        .bind(failed.stage.as_str())
        .bind(&failed.error)
        .bind(failed.failed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        tracing::warn!(
            dlq_id = id,
            partition = failed.partition,
            offset = failed.offset,
            stage = %failed.stage,
            error = %failed.error,
            "Message added to dead letter table"
        );

        metrics::counter!("ingest_dead_letters_total", "stage" => failed.stage.as_str())
            .increment(1);

        Ok(id)
    }

    /// List pending dead letters, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError> {
        #[allow(clippy::cast_possible_wrap)] // Limit is reasonable size, i64 is safe
        let rows = sqlx::query(
            r"
            SELECT
                id, topic, partition_id, message_offset, order_uid, payload, stage,
                error_message, failed_at, status, resolved_at, resolution_notes
            FROM failed_messages
            WHERE status = 'pending'
            ORDER BY failed_at ASC
            LIMIT $1
            ",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(Self::row_to_dead_letter).collect()
    }

    /// Mark a dead letter as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub async fn mark_resolved(&self, id: i64, notes: Option<&str>) -> Result<(), StoreError> {
        self.close_entry(id, DeadLetterStatus::Resolved, notes).await?;
        tracing::info!(dlq_id = id, "Dead letter marked as resolved");
        Ok(())
    }

    /// Mark a dead letter as permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        self.close_entry(id, DeadLetterStatus::Discarded, Some(reason))
            .await?;
        tracing::warn!(dlq_id = id, reason = reason, "Dead letter discarded");
        Ok(())
    }

    /// Number of pending dead letters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_messages WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(count)
    }

    async fn close_entry(
        &self,
        id: i64,
        status: DeadLetterStatus,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE failed_messages
            SET status = $1, resolved_at = NOW(), resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn row_to_dead_letter(row: &sqlx::postgres::PgRow) -> Result<DeadLetter, StoreError> {
        let stage: String = row.get("stage");
        let status: String = row.get("status");

        Ok(DeadLetter {
            id: row.get("id"),
            message: FailedMessage {
                topic: row.get("topic"),
                partition: row.get("partition_id"),
                offset: row.get("message_offset"),
                order_uid: row.get("order_uid"),
                payload: row.get("payload"),
                stage: parse_stage(&stage)?,
                error: row.get("error_message"),
                failed_at: row.get("failed_at"),
            },
            status: DeadLetterStatus::parse(&status)?,
            resolved_at: row.get("resolved_at"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

impl FailureSink for PostgresFailureSink {
    fn record(
        &self,
        failed: FailedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), FailureSinkError>> + Send + '_>> {
        Box::pin(async move {
            self.add_entry(&failed)
                .await
                .map(|_| ())
                .map_err(|e| FailureSinkError::Write(e.to_string()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in &[
            DeadLetterStatus::Pending,
            DeadLetterStatus::Resolved,
            DeadLetterStatus::Discarded,
        ] {
            let parsed = DeadLetterStatus::parse(status.as_str()).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn status_invalid() {
        assert!(DeadLetterStatus::parse("processing").is_err());
    }

    #[test]
    fn stage_parses_its_own_names() {
        for stage in [
            FailureStage::Decode,
            FailureStage::Validation,
            FailureStage::Store,
        ] {
            assert_eq!(parse_stage(stage.as_str()).unwrap(), stage);
        }
        assert!(parse_stage("network").is_err());
    }
}
