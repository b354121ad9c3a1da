//! Record batching for delivery.
//!
//! Every record submitted to the pipeline lands in a per-partition batch.
//! A batch is flushed when either:
//! - The linger timeout expires (default: 5ms)
//! - The batch reaches max bytes or max records
//! - An explicit flush or shutdown is requested
//!
//! A flush appends the batch over the pooled broker link, retrying
//! transient failures with bounded exponential backoff. Each submitted
//! record gets exactly one [`DeliveryAcknowledgment`] on its oneshot
//! channel, success or failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conduit_core::{DeliveryAcknowledgment, ErrorKind, Offset, PartitionId, Record};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::ConnectionPool;
use crate::error::{PipelineError, PipelineResult};

/// Submission channel depth. Bounded so a stalled broker applies
/// backpressure to producers instead of growing the heap.
const CHANNEL_CAPACITY: usize = 10_000;

/// Retry schedule for transient delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Backoff to wait after attempt number `attempt` (1-based) fails.
    #[must_use]
    pub const fn backoff(self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let ms = if exponent >= 32 {
            self.max_backoff_ms
        } else {
            let scaled = self.initial_backoff_ms.saturating_mul(1_u64 << exponent);
            if scaled > self.max_backoff_ms {
                self.max_backoff_ms
            } else {
                scaled
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

/// Configuration for delivery batching.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Maximum time to wait for additional records before flushing
    /// (milliseconds).
    pub linger_ms: u64,
    /// Maximum total bytes in a batch before forcing flush.
    pub max_batch_bytes: u32,
    /// Maximum number of records in a batch.
    pub max_batch_records: u32,
    /// Retry schedule for transient append failures.
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            linger_ms: 5,
            max_batch_bytes: 512 * 1024,
            max_batch_records: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Linger,
    Size,
    Explicit,
    Shutdown,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Linger => "linger",
            Self::Size => "size",
            Self::Explicit => "explicit",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A record waiting to be batched.
pub(crate) struct PendingDelivery {
    topic: String,
    partition: PartitionId,
    record: Record,
    result_tx: oneshot::Sender<DeliveryAcknowledgment>,
}

/// Message sent to the delivery task.
pub(crate) enum DeliveryMessage {
    Submit(PendingDelivery),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle for submitting records to the delivery task.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<DeliveryMessage>,
}

impl DeliveryHandle {
    /// Submits a record for delivery to one partition.
    ///
    /// Returns a receiver that resolves with the acknowledgment once the
    /// batch containing the record is appended or given up on.
    ///
    /// # Errors
    /// Returns [`PipelineError::Shutdown`] if the delivery task is gone.
    pub async fn submit(
        &self,
        topic: impl Into<String>,
        partition: PartitionId,
        record: Record,
    ) -> PipelineResult<oneshot::Receiver<DeliveryAcknowledgment>> {
        let (result_tx, result_rx) = oneshot::channel();
        let pending = PendingDelivery {
            topic: topic.into(),
            partition,
            record,
            result_tx,
        };
        self.tx
            .send(DeliveryMessage::Submit(pending))
            .await
            .map_err(|_| PipelineError::Shutdown)?;
        Ok(result_rx)
    }

    /// Flushes all open batches and waits for them to be appended.
    ///
    /// # Errors
    /// Returns [`PipelineError::Shutdown`] if the delivery task is gone.
    pub async fn flush(&self) -> PipelineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(DeliveryMessage::Flush(done_tx))
            .await
            .map_err(|_| PipelineError::Shutdown)?;
        done_rx.await.map_err(|_| PipelineError::Shutdown)
    }

    /// Tells the delivery task to flush everything and stop.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(DeliveryMessage::Shutdown).await;
    }
}

/// Creates the delivery channel and handle.
#[must_use]
pub(crate) fn create_delivery() -> (DeliveryHandle, mpsc::Receiver<DeliveryMessage>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (DeliveryHandle { tx }, rx)
}

/// Accumulated batch for a single (topic, partition).
struct AccumulatedBatch {
    records: Vec<Record>,
    result_txs: Vec<oneshot::Sender<DeliveryAcknowledgment>>,
    total_bytes: u32,
    first_record_time: Instant,
}

impl AccumulatedBatch {
    fn new() -> Self {
        Self {
            records: Vec::with_capacity(64),
            result_txs: Vec::with_capacity(64),
            total_bytes: 0,
            first_record_time: Instant::now(),
        }
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Background task that batches records and appends them to the broker.
pub(crate) async fn delivery_task(
    mut rx: mpsc::Receiver<DeliveryMessage>,
    pool: Arc<ConnectionPool>,
    config: DeliveryConfig,
) {
    let mut batches: HashMap<(String, PartitionId), AccumulatedBatch> = HashMap::new();
    let linger = Duration::from_millis(config.linger_ms);

    info!(
        linger_ms = config.linger_ms,
        max_batch_bytes = config.max_batch_bytes,
        max_batch_records = config.max_batch_records,
        max_attempts = config.retry.max_attempts,
        "delivery task started"
    );

    loop {
        let next_deadline = batches
            .values()
            .filter(|b| !b.is_empty())
            .map(|b| b.first_record_time + linger)
            .min();

        let timeout = next_deadline.map(|deadline| {
            deadline
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::ZERO)
        });

        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(DeliveryMessage::Submit(pending)) => {
                        handle_submit(pending, &mut batches, &pool, &config).await;
                    }
                    Some(DeliveryMessage::Flush(done_tx)) => {
                        flush_all(&mut batches, &pool, &config, FlushReason::Explicit).await;
                        let _ = done_tx.send(());
                    }
                    Some(DeliveryMessage::Shutdown) | None => {
                        flush_all(&mut batches, &pool, &config, FlushReason::Shutdown).await;
                        info!("delivery task shutting down");
                        break;
                    }
                }
            }
            () = async {
                if let Some(duration) = timeout {
                    tokio::time::sleep(duration).await;
                } else {
                    // No open batches, wait for the next message.
                    std::future::pending::<()>().await;
                }
            } => {
                let now = Instant::now();
                let due: Vec<(String, PartitionId)> = batches
                    .iter()
                    .filter(|(_, b)| {
                        !b.is_empty() && now.duration_since(b.first_record_time) >= linger
                    })
                    .map(|(key, _)| key.clone())
                    .collect();

                for key in due {
                    if let Some(batch) = batches.remove(&key) {
                        flush_batch(&key.0, key.1, batch, &pool, &config.retry, FlushReason::Linger)
                            .await;
                    }
                }
            }
        }
    }
}

async fn handle_submit(
    pending: PendingDelivery,
    batches: &mut HashMap<(String, PartitionId), AccumulatedBatch>,
    pool: &Arc<ConnectionPool>,
    config: &DeliveryConfig,
) {
    let key = (pending.topic, pending.partition);
    #[allow(clippy::cast_possible_truncation)]
    let record_bytes = pending.record.size() as u32;

    let batch = batches.entry(key.clone()).or_insert_with(AccumulatedBatch::new);

    let would_exceed_bytes = batch.total_bytes + record_bytes > config.max_batch_bytes;
    #[allow(clippy::cast_possible_truncation)]
    let would_exceed_records = batch.records.len() as u32 >= config.max_batch_records;

    if !batch.is_empty() && (would_exceed_bytes || would_exceed_records) {
        let full = std::mem::replace(batch, AccumulatedBatch::new());
        flush_batch(&key.0, key.1, full, pool, &config.retry, FlushReason::Size).await;
    }

    if batch.is_empty() {
        batch.first_record_time = Instant::now();
    }
    batch.records.push(pending.record);
    batch.result_txs.push(pending.result_tx);
    batch.total_bytes += record_bytes;
}

async fn flush_all(
    batches: &mut HashMap<(String, PartitionId), AccumulatedBatch>,
    pool: &Arc<ConnectionPool>,
    config: &DeliveryConfig,
    reason: FlushReason,
) {
    for ((topic, partition), batch) in batches.drain() {
        if !batch.is_empty() {
            flush_batch(&topic, partition, batch, pool, &config.retry, reason).await;
        }
    }
}

/// Appends one batch, retrying transient failures, and acknowledges every
/// record in it exactly once.
async fn flush_batch(
    topic: &str,
    partition: PartitionId,
    batch: AccumulatedBatch,
    pool: &Arc<ConnectionPool>,
    retry: &RetryPolicy,
    reason: FlushReason,
) {
    let batch_size = batch.records.len();
    debug!(
        topic,
        partition = %partition,
        reason = reason.as_str(),
        batch_size,
        batch_bytes = batch.total_bytes,
        "batch flush"
    );

    let max_attempts = retry.max_attempts.max(1);
    let mut failure_kind = ErrorKind::DeliveryFailed;

    for attempt in 1..=max_attempts {
        let outcome = match pool.acquire().await {
            Ok(link) => link.append(topic, partition, batch.records.clone()).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(base) => {
                if attempt > 1 {
                    info!(topic, partition = %partition, attempt, "delivery recovered");
                }
                for (i, result_tx) in batch.result_txs.into_iter().enumerate() {
                    let offset = Offset::new(base.get() + i as u64);
                    let _ = result_tx.send(DeliveryAcknowledgment::appended(partition, offset));
                }
                return;
            }
            Err(error) if error.is_transient() && attempt < max_attempts => {
                pool.invalidate().await;
                let backoff = retry.backoff(attempt);
                warn!(
                    topic,
                    partition = %partition,
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    %error,
                    "transient delivery failure, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(error) => {
                if error.is_transient() {
                    pool.invalidate().await;
                }
                // A transient error on the last attempt means the retry
                // budget ran out, which is a delivery failure, not a
                // connection event.
                failure_kind = if error.is_transient() {
                    ErrorKind::DeliveryFailed
                } else {
                    error.kind()
                };
                warn!(
                    topic,
                    partition = %partition,
                    attempt,
                    %error,
                    "delivery failed"
                );
                break;
            }
        }
    }

    for result_tx in batch.result_txs {
        let _ = result_tx.send(DeliveryAcknowledgment::failed(partition, failure_kind));
    }
}
