//! Shared test harness.
//!
//! Builds provisioned cluster/pipeline pairs and provides a collecting
//! message handler. Helpers panic on setup failure; they run only inside
//! tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use conduit_catalog::{TopicCatalog, TopicDescriptor};
use conduit_client::{Delivery, MessageHandler};
use conduit_core::{ErrorKind, GroupId, Offset, PartitionId};
use conduit_pipeline::{DeliveryPipeline, MemoryCluster, PipelineConfig};

/// Default group used across tests, matching a typical deployment name.
#[must_use]
pub fn test_group() -> GroupId {
    GroupId::new("my-group-id").unwrap_or_else(|_| unreachable!("valid literal"))
}

/// Starts a pipeline over `cluster` with `topic` declared and
/// provisioned.
///
/// # Panics
/// Panics if declaration or provisioning fails; tests treat that as a
/// broken fixture.
pub async fn provisioned_pipeline(
    cluster: &MemoryCluster,
    topic: &str,
    partitions: u32,
) -> Arc<DeliveryPipeline> {
    let mut catalog = TopicCatalog::new();
    catalog
        .declare(TopicDescriptor::builder(topic).partitions(partitions).build())
        .expect("declare test topic");

    let pipeline = Arc::new(DeliveryPipeline::start(
        PipelineConfig::new(vec!["mem://1".to_string()]),
        Arc::new(cluster.clone()),
    ));
    pipeline.provision(&catalog).await.expect("provision test topic");
    pipeline
}

/// One record as observed by a [`Collector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRecord {
    /// Partition the record came from.
    pub partition: PartitionId,
    /// Offset of the record.
    pub offset: Offset,
    /// Record payload.
    pub value: Bytes,
}

/// Message handler that records every delivery it sees.
pub struct Collector {
    seen: Arc<Mutex<Vec<SeenRecord>>>,
}

impl Collector {
    /// Creates the handler and the log it appends to.
    #[must_use]
    pub fn new() -> (Self, Arc<Mutex<Vec<SeenRecord>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                seen: Arc::clone(&seen),
            },
            seen,
        )
    }
}

impl MessageHandler for Collector {
    fn on_message(&mut self, delivery: Delivery<'_>) -> Result<(), ErrorKind> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(SeenRecord {
                partition: delivery.partition,
                offset: delivery.record.offset,
                value: delivery.record.value.clone(),
            });
        Ok(())
    }
}

/// Polls `condition` until it holds.
///
/// # Panics
/// Panics if the condition does not hold within ~2.5 seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}
