//! In-memory message source and failure sink.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use order_stream_core::{
    FailedMessage, FailureSink, FailureSinkError, Fetch, MessageSource, Order, RawMessage,
    SourceError,
};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Queue-backed [`MessageSource`] that records every commit.
///
/// Messages are assigned increasing offsets on partition 0 as they are pushed. Fetch errors
/// can be queued in between to simulate a flaky broker.
///
/// # Example
///
/// ```
/// use order_stream_core::{Fetch, MessageSource};
/// use order_stream_testing::InMemoryMessageSource;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = InMemoryMessageSource::new("orders");
/// source.push_raw(b"{}".to_vec());
///
/// if let Fetch::Message(message) = source.fetch_next(Duration::from_millis(10)).await? {
///     source.commit(&message).await?;
/// }
/// assert_eq!(source.committed_offsets(), vec![0]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryMessageSource {
    topic: String,
    pending: Arc<Mutex<VecDeque<Result<RawMessage, SourceError>>>>,
    committed: Arc<Mutex<Vec<RawMessage>>>,
    next_offset: Arc<AtomicI64>,
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryMessageSource {
    /// Create an empty source for `topic`.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            committed: Arc::new(Mutex::new(Vec::new())),
            next_offset: Arc::new(AtomicI64::new(0)),
            notify: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicUsize::new(0)),
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a raw payload. Returns the offset it was given.
    pub fn push_raw(&self, payload: Vec<u8>) -> i64 {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let message = RawMessage::new(self.topic.clone(), 0, offset, payload);
        self.pending.lock().unwrap().push_back(Ok(message));
        self.notify.notify_one();
        offset
    }

    /// Enqueue an order as its JSON wire form. Returns the offset it was given.
    pub fn push_order(&self, order: &Order) -> i64 {
        self.push_raw(serde_json::to_vec(order).unwrap())
    }

    /// Make the next fetch fail with `error`.
    pub fn push_error(&self, error: SourceError) {
        self.pending.lock().unwrap().push_back(Err(error));
        self.notify.notify_one();
    }

    /// Make every commit fail with [`SourceError::Commit`]. Failed commits are not recorded.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Offsets committed so far, in commit order.
    #[must_use]
    pub fn committed_offsets(&self) -> Vec<i64> {
        self.committed
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.offset)
            .collect()
    }

    /// Number of messages and errors not fetched yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times `close` has been called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Wait until `count` messages have been committed, or `timeout` elapses.
    ///
    /// Returns `true` if the count was reached.
    pub async fn wait_for_commits(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.committed.lock().unwrap().len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl MessageSource for InMemoryMessageSource {
    fn fetch_next(
        &self,
        deadline: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Fetch, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let until = Instant::now() + deadline;
            loop {
                if self.is_closed() {
                    return Ok(Fetch::Closed);
                }
                let next = self.pending.lock().unwrap().pop_front();
                match next {
                    Some(Ok(message)) => return Ok(Fetch::Message(message)),
                    Some(Err(e)) => return Err(e),
                    None => {}
                }
                if tokio::time::timeout_at(until, self.notify.notified())
                    .await
                    .is_err()
                {
                    return Ok(Fetch::Idle);
                }
            }
        })
    }

    fn commit<'a>(
        &'a self,
        message: &'a RawMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(SourceError::Commit(format!(
                    "injected commit failure at offset {}",
                    message.offset
                )));
            }
            self.committed.lock().unwrap().push(message.clone());
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>> {
        Box::pin(async move {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
            self.notify.notify_waiters();
            Ok(())
        })
    }
}

/// [`FailureSink`] that keeps every skipped message in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingFailureSink {
    records: Arc<Mutex<Vec<FailedMessage>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingFailureSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `record` call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn records(&self) -> Vec<FailedMessage> {
        self.records.lock().unwrap().clone()
    }
}

impl FailureSink for RecordingFailureSink {
    fn record(
        &self,
        failed: FailedMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), FailureSinkError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FailureSinkError::Write("injected sink failure".to_string()));
            }
            self.records.lock().unwrap().push(failed);
            Ok(())
        })
    }
}
