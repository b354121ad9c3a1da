//! The delivery pipeline facade.
//!
//! One `DeliveryPipeline` owns a connection pool and a background
//! delivery task. Producers hand it records; consumers drive fetch,
//! commit, and group membership through it. Dropping the pipeline without
//! calling [`DeliveryPipeline::shutdown`] abandons open batches, so
//! orderly code shuts it down.

use std::sync::Arc;
use std::time::Duration;

use conduit_catalog::TopicCatalog;
use conduit_core::{DeliveryAcknowledgment, GroupId, Offset, PartitionId, Record};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::batcher::{create_delivery, delivery_task, DeliveryConfig, DeliveryHandle};
use crate::broker::Connector;
use crate::connection::ConnectionPool;
use crate::error::{PipelineError, PipelineResult};

/// Configuration for a [`DeliveryPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Broker addresses to dial, tried in order.
    pub bootstrap: Vec<String>,
    /// Dial rounds over the bootstrap list before reporting the broker
    /// unavailable.
    pub max_dial_rounds: u32,
    /// Batching and retry settings.
    pub delivery: DeliveryConfig,
    /// How long group joins may wait for an assignment.
    pub assignment_timeout_ms: u64,
}

impl PipelineConfig {
    /// Creates a configuration with defaults for the given bootstrap
    /// addresses.
    #[must_use]
    pub fn new(bootstrap: Vec<String>) -> Self {
        Self {
            bootstrap,
            max_dial_rounds: 3,
            delivery: DeliveryConfig::default(),
            assignment_timeout_ms: 10_000,
        }
    }
}

/// The at-least-once record delivery pipeline.
pub struct DeliveryPipeline {
    pool: Arc<ConnectionPool>,
    handle: DeliveryHandle,
    task: JoinHandle<()>,
    assignment_timeout: Duration,
}

impl DeliveryPipeline {
    /// Starts a pipeline over the given connector.
    ///
    /// Connections are dialed lazily; this spawns the delivery task but
    /// does not touch the network.
    #[must_use]
    pub fn start(config: PipelineConfig, connector: Arc<dyn Connector>) -> Self {
        let pool = Arc::new(ConnectionPool::new(
            config.bootstrap,
            connector,
            config.max_dial_rounds,
        ));
        let (handle, rx) = create_delivery();
        let task = tokio::spawn(delivery_task(rx, Arc::clone(&pool), config.delivery));
        info!("delivery pipeline started");
        Self {
            pool,
            handle,
            task,
            assignment_timeout: Duration::from_millis(config.assignment_timeout_ms),
        }
    }

    /// Creates every topic in the catalog on the broker.
    ///
    /// # Errors
    /// Propagates connection and provisioning failures.
    pub async fn provision(&self, catalog: &TopicCatalog) -> PipelineResult<()> {
        let link = self.pool.acquire().await?;
        for descriptor in catalog.iter() {
            link.provision_topic(descriptor).await?;
            debug!(topic = %descriptor.name, "topic provisioned on broker");
        }
        self.pool.refresh_metadata().await?;
        Ok(())
    }

    /// Partition count of a provisioned topic.
    ///
    /// # Errors
    /// Returns [`PipelineError::UnknownTopic`] for unprovisioned topics.
    pub async fn partition_count(&self, topic: &str) -> PipelineResult<u32> {
        self.pool.partition_count(topic).await
    }

    /// Queues a record for delivery to one partition.
    ///
    /// Returns a receiver resolving with the acknowledgment once the
    /// record's batch is appended or given up on.
    ///
    /// # Errors
    /// Returns [`PipelineError::Shutdown`] if the pipeline has stopped.
    pub async fn send(
        &self,
        topic: impl Into<String>,
        partition: PartitionId,
        record: Record,
    ) -> PipelineResult<oneshot::Receiver<DeliveryAcknowledgment>> {
        self.handle.submit(topic, partition, record).await
    }

    /// Flushes all open batches and waits for their delivery attempts to
    /// finish.
    ///
    /// # Errors
    /// Returns [`PipelineError::Shutdown`] if the pipeline has stopped.
    pub async fn flush(&self) -> PipelineResult<()> {
        self.handle.flush().await
    }

    /// Reads up to `max_records` records of one partition starting at
    /// `from`.
    ///
    /// # Errors
    /// Propagates connection and fetch failures.
    pub async fn fetch(
        &self,
        topic: &str,
        partition: PartitionId,
        from: Offset,
        max_records: u32,
    ) -> PipelineResult<Vec<Record>> {
        let link = self.pool.acquire().await?;
        match link.fetch(topic, partition, from, max_records).await {
            Err(error) if error.is_transient() => {
                self.pool.invalidate().await;
                Err(error)
            }
            other => other,
        }
    }

    /// Commits `offset` for `group` on one partition.
    ///
    /// # Errors
    /// Propagates connection and commit failures.
    pub async fn commit(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> PipelineResult<()> {
        let link = self.pool.acquire().await?;
        match link.commit_offset(group, topic, partition, offset).await {
            Err(error) if error.is_transient() => {
                self.pool.invalidate().await;
                Err(error)
            }
            other => other,
        }
    }

    /// The group's committed offset for one partition.
    ///
    /// # Errors
    /// Propagates connection failures.
    pub async fn committed(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
    ) -> PipelineResult<Option<Offset>> {
        let link = self.pool.acquire().await?;
        link.committed_offset(group, topic, partition).await
    }

    /// Joins `group` as `member_id` and waits for a partition assignment
    /// on `topic`.
    ///
    /// # Errors
    /// Returns [`PipelineError::AssignmentTimeout`] if no assignment
    /// arrives within the configured wait.
    pub async fn join_group(
        &self,
        group: &GroupId,
        member_id: &str,
        topic: &str,
    ) -> PipelineResult<Vec<PartitionId>> {
        let join = async {
            let link = self.pool.acquire().await?;
            link.join_group(group, member_id, topic).await
        };
        match tokio::time::timeout(self.assignment_timeout, join).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::AssignmentTimeout {
                timeout_ms: u64::try_from(self.assignment_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }),
        }
    }

    /// Flushes open batches and stops the delivery task.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        let _ = self.task.await;
        info!("delivery pipeline stopped");
    }
}
