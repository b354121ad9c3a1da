//! Record producer.
//!
//! Routes each record to a partition and hands it to the delivery
//! pipeline. Partition selection is deterministic for keyed records
//! (same key, same partition, always) and round-robin for keyless ones.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use conduit_core::{DeliveryAcknowledgment, ErrorKind, PartitionId, Record};
use conduit_pipeline::DeliveryPipeline;
use tracing::{debug, info};

use crate::error::ClientResult;

/// Partition selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partitioner {
    /// Keyed records go to `hash(key) % partition_count`; keyless
    /// records fall back to round-robin.
    #[default]
    KeyHash,
    /// Every record goes round-robin, keys ignored.
    RoundRobin,
}

/// Producer configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProducerConfig {
    /// How records are routed to partitions.
    pub partitioner: Partitioner,
}

/// Publishes records to one topic.
///
/// Cheap to share behind an `Arc`; `send` may be called from many tasks
/// concurrently. Batching and retry live in the pipeline.
pub struct Producer {
    pipeline: Arc<DeliveryPipeline>,
    topic: String,
    partition_count: u32,
    partitioner: Partitioner,
    round_robin: AtomicUsize,
}

impl Producer {
    /// Creates a producer for `topic`.
    ///
    /// # Errors
    /// Returns an error if the topic is not provisioned on the broker.
    pub async fn new(
        pipeline: Arc<DeliveryPipeline>,
        topic: impl Into<String>,
        config: ProducerConfig,
    ) -> ClientResult<Self> {
        let topic = topic.into();
        let partition_count = pipeline.partition_count(&topic).await?;

        // Precondition: provisioned topics always have at least one partition.
        debug_assert!(partition_count >= 1);

        info!(topic = topic.as_str(), partition_count, "producer created");
        Ok(Self {
            pipeline,
            topic,
            partition_count,
            partitioner: config.partitioner,
            round_robin: AtomicUsize::new(0),
        })
    }

    /// Queues a record and returns a future resolving with its
    /// acknowledgment.
    ///
    /// The returned future is infallible: delivery failures resolve it
    /// with `success = false` and a failure kind rather than an `Err`.
    ///
    /// # Errors
    /// Returns an error only if the pipeline has already shut down.
    pub async fn send(
        &self,
        record: Record,
    ) -> ClientResult<impl Future<Output = DeliveryAcknowledgment>> {
        let partition = self.select_partition(record.key.as_ref());
        debug!(
            topic = self.topic.as_str(),
            partition = %partition,
            keyed = record.key.is_some(),
            "record queued"
        );
        let rx = self.pipeline.send(&self.topic, partition, record).await?;
        Ok(async move {
            rx.await.unwrap_or_else(|_| {
                DeliveryAcknowledgment::failed(partition, ErrorKind::BrokerUnavailable)
            })
        })
    }

    /// Queues a record and waits for its acknowledgment.
    ///
    /// # Errors
    /// Returns an error only if the pipeline has already shut down.
    pub async fn send_and_wait(&self, record: Record) -> ClientResult<DeliveryAcknowledgment> {
        Ok(self.send(record).await?.await)
    }

    /// Forces all pending batches out and waits for their delivery
    /// attempts to finish.
    ///
    /// # Errors
    /// Returns an error only if the pipeline has already shut down.
    pub async fn flush(&self) -> ClientResult<()> {
        self.pipeline.flush().await?;
        Ok(())
    }

    /// Flushes and drops the producer. The pipeline itself keeps running
    /// for other handles; its owner shuts it down.
    ///
    /// # Errors
    /// Returns an error only if the pipeline has already shut down.
    pub async fn close(self) -> ClientResult<()> {
        self.flush().await?;
        info!(topic = self.topic.as_str(), "producer closed");
        Ok(())
    }

    /// The partition a record with this key would be routed to.
    fn select_partition(&self, key: Option<&Bytes>) -> PartitionId {
        let index = match (self.partitioner, key) {
            (Partitioner::KeyHash, Some(key)) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                hasher.finish() % u64::from(self.partition_count)
            }
            _ => {
                let next = self.round_robin.fetch_add(1, Ordering::Relaxed);
                (next as u64) % u64::from(self.partition_count)
            }
        };
        PartitionId::new(index)
    }
}
