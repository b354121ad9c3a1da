//! Broker access traits and cluster metadata.
//!
//! [`BrokerLink`] is the seam between the pipeline and whatever is on the
//! other side of it. The pipeline never talks to a broker directly; it
//! dials a [`Connector`] and drives the link it gets back. Tests swap in
//! the in-memory cluster through the same two traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_catalog::TopicDescriptor;
use conduit_core::{GroupId, NodeId, Offset, PartitionId, Record};

use crate::error::PipelineResult;

/// Snapshot of cluster topology as seen through one link.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    /// Live broker nodes.
    pub nodes: Vec<NodeId>,
    /// Provisioned topics and their partition counts.
    pub topics: HashMap<String, u32>,
}

impl ClusterMetadata {
    /// Partition count for a topic, if the topic is provisioned.
    #[must_use]
    pub fn partition_count(&self, topic: &str) -> Option<u32> {
        self.topics.get(topic).copied()
    }
}

/// A live connection to a broker.
///
/// All operations are at-least-once from the caller's perspective: a lost
/// connection mid-call may leave the broker having applied the operation,
/// so callers retry and the broker side must tolerate replays (appends
/// may duplicate, commits are monotonic).
#[async_trait]
pub trait BrokerLink: Send + Sync {
    /// Creates the topic on the broker. Idempotent for an identical
    /// descriptor.
    async fn provision_topic(&self, descriptor: &TopicDescriptor) -> PipelineResult<()>;

    /// Appends a batch of records to one partition.
    ///
    /// Returns the offset assigned to the first record; the rest follow
    /// contiguously.
    async fn append(
        &self,
        topic: &str,
        partition: PartitionId,
        records: Vec<Record>,
    ) -> PipelineResult<Offset>;

    /// Reads up to `max_records` records starting at `from`.
    ///
    /// Returns an empty vec when `from` is at or past the log end.
    async fn fetch(
        &self,
        topic: &str,
        partition: PartitionId,
        from: Offset,
        max_records: u32,
    ) -> PipelineResult<Vec<Record>>;

    /// Records that `group` has processed everything below `offset` in
    /// the partition. Commits never move backwards.
    async fn commit_offset(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> PipelineResult<()>;

    /// The group's committed offset for the partition, if any commit has
    /// been made.
    async fn committed_offset(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
    ) -> PipelineResult<Option<Offset>>;

    /// Registers `member_id` in `group` and returns the partitions of
    /// `topic` assigned to it.
    async fn join_group(
        &self,
        group: &GroupId,
        member_id: &str,
        topic: &str,
    ) -> PipelineResult<Vec<PartitionId>>;

    /// Current cluster topology.
    async fn metadata(&self) -> PipelineResult<ClusterMetadata>;
}

/// Dials broker addresses into live links.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to the broker at `addr`.
    async fn dial(&self, addr: &str) -> PipelineResult<Arc<dyn BrokerLink>>;
}
