//! In-process broker cluster.
//!
//! Backs the pipeline in tests and single-process demos. Behaves like a
//! real cluster at the [`BrokerLink`] seam: offsets are contiguous per
//! partition, commits are monotonic, group assignment is round-robin over
//! join order, and fault injection can make the next N dials or appends
//! fail the way a dropped TCP connection would.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_catalog::TopicDescriptor;
use conduit_core::{GroupId, NodeId, Offset, PartitionId, Record};
use tokio::sync::Mutex;
use tracing::debug;

use crate::broker::{BrokerLink, ClusterMetadata, Connector};
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug)]
struct TopicState {
    partition_count: u32,
    max_message_bytes: u32,
    logs: Vec<Vec<Record>>,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Members in join order. Assignment is round-robin over this list.
    members: Vec<String>,
    /// Committed offsets keyed by (topic, partition).
    committed: HashMap<(String, PartitionId), Offset>,
}

#[derive(Debug, Default)]
struct ClusterState {
    topics: HashMap<String, TopicState>,
    groups: HashMap<GroupId, GroupState>,
    fail_connects: u32,
    fail_appends: u32,
}

/// A single-process broker cluster.
///
/// Cloning is cheap and every clone shares the same state, so a test can
/// hold one handle for fault injection while the pipeline dials its own.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` dial attempts fail with a connection error.
    pub async fn fail_connects(&self, count: u32) {
        self.state.lock().await.fail_connects = count;
    }

    /// Makes the next `count` append calls fail with a connection error.
    pub async fn fail_appends(&self, count: u32) {
        self.state.lock().await.fail_appends = count;
    }

    /// Number of records in one partition log. Test observability.
    ///
    /// # Errors
    /// Returns [`PipelineError::UnknownTopic`] or
    /// [`PipelineError::UnknownPartition`] for unprovisioned targets.
    pub async fn log_len(&self, topic: &str, partition: PartitionId) -> PipelineResult<usize> {
        let state = self.state.lock().await;
        let topic_state = state
            .topics
            .get(topic)
            .ok_or_else(|| PipelineError::UnknownTopic(topic.to_string()))?;
        let log = partition_log(topic_state, topic, partition)?;
        Ok(log.len())
    }
}

fn partition_log<'a>(
    topic_state: &'a TopicState,
    topic: &str,
    partition: PartitionId,
) -> PipelineResult<&'a Vec<Record>> {
    let index = usize::try_from(partition.get()).map_err(|_| PipelineError::UnknownPartition {
        topic: topic.to_string(),
        partition,
    })?;
    topic_state
        .logs
        .get(index)
        .ok_or(PipelineError::UnknownPartition {
            topic: topic.to_string(),
            partition,
        })
}

#[async_trait]
impl Connector for MemoryCluster {
    async fn dial(&self, addr: &str) -> PipelineResult<Arc<dyn BrokerLink>> {
        let mut state = self.state.lock().await;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            debug!(addr, remaining = state.fail_connects, "injected dial failure");
            return Err(PipelineError::ConnectionLost {
                reason: format!("injected dial failure to {addr}"),
            });
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl BrokerLink for MemoryCluster {
    async fn provision_topic(&self, descriptor: &TopicDescriptor) -> PipelineResult<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.topics.get(&descriptor.name) {
            // Redeclaration is a no-op as long as the shape matches.
            // Changing the partition count of a live topic is refused; the
            // broker has no reshape path.
            if existing.partition_count == descriptor.partition_count {
                return Ok(());
            }
            return Err(PipelineError::ProvisionConflict {
                topic: descriptor.name.clone(),
                existing: existing.partition_count,
            });
        }

        let partitions = usize::try_from(descriptor.partition_count).unwrap_or(usize::MAX);
        state.topics.insert(
            descriptor.name.clone(),
            TopicState {
                partition_count: descriptor.partition_count,
                max_message_bytes: descriptor.max_message_bytes,
                logs: vec![Vec::new(); partitions],
            },
        );
        debug!(
            topic = %descriptor.name,
            partitions = descriptor.partition_count,
            "topic provisioned"
        );
        Ok(())
    }

    async fn append(
        &self,
        topic: &str,
        partition: PartitionId,
        records: Vec<Record>,
    ) -> PipelineResult<Offset> {
        let mut state = self.state.lock().await;
        if state.fail_appends > 0 {
            state.fail_appends -= 1;
            debug!(topic, remaining = state.fail_appends, "injected append failure");
            return Err(PipelineError::ConnectionLost {
                reason: "injected append failure".to_string(),
            });
        }

        let topic_state = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| PipelineError::UnknownTopic(topic.to_string()))?;
        let limit = topic_state.max_message_bytes;
        if let Some(oversized) = records.iter().find(|r| r.size() > limit as usize) {
            return Err(PipelineError::RecordTooLarge {
                size: oversized.size(),
                limit,
            });
        }

        let index = usize::try_from(partition.get()).map_err(|_| PipelineError::UnknownPartition {
            topic: topic.to_string(),
            partition,
        })?;
        let log = topic_state
            .logs
            .get_mut(index)
            .ok_or(PipelineError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })?;

        let base = Offset::new(log.len() as u64);
        for (i, mut record) in records.into_iter().enumerate() {
            record.offset = Offset::new(base.get() + i as u64);
            log.push(record);
        }

        // Invariant: offsets in a partition log are contiguous from zero.
        debug_assert!(log
            .last()
            .map_or(true, |r| r.offset.get() + 1 == log.len() as u64));

        Ok(base)
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: PartitionId,
        from: Offset,
        max_records: u32,
    ) -> PipelineResult<Vec<Record>> {
        let state = self.state.lock().await;
        let topic_state = state
            .topics
            .get(topic)
            .ok_or_else(|| PipelineError::UnknownTopic(topic.to_string()))?;
        let log = partition_log(topic_state, topic, partition)?;

        let start = usize::try_from(from.get()).unwrap_or(usize::MAX);
        if start >= log.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(max_records as usize).min(log.len());
        Ok(log[start..end].to_vec())
    }

    async fn commit_offset(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> PipelineResult<()> {
        let mut state = self.state.lock().await;
        if !state.topics.contains_key(topic) {
            return Err(PipelineError::UnknownTopic(topic.to_string()));
        }

        let group_state = state.groups.entry(group.clone()).or_default();
        let entry = group_state
            .committed
            .entry((topic.to_string(), partition))
            .or_insert(Offset::earliest());
        // Commits never move backwards; a stale commit is dropped.
        if offset > *entry {
            *entry = offset;
        }
        Ok(())
    }

    async fn committed_offset(
        &self,
        group: &GroupId,
        topic: &str,
        partition: PartitionId,
    ) -> PipelineResult<Option<Offset>> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .get(group)
            .and_then(|g| g.committed.get(&(topic.to_string(), partition)))
            .copied())
    }

    async fn join_group(
        &self,
        group: &GroupId,
        member_id: &str,
        topic: &str,
    ) -> PipelineResult<Vec<PartitionId>> {
        let mut state = self.state.lock().await;
        let partition_count = state
            .topics
            .get(topic)
            .map(|t| t.partition_count)
            .ok_or_else(|| PipelineError::UnknownTopic(topic.to_string()))?;

        let group_state = state.groups.entry(group.clone()).or_default();
        if !group_state.members.iter().any(|m| m == member_id) {
            group_state.members.push(member_id.to_string());
        }

        // Round-robin over join order: partition i goes to member i % n.
        let member_index = group_state
            .members
            .iter()
            .position(|m| m == member_id)
            .unwrap_or(0);
        let member_count = group_state.members.len();

        let assigned: Vec<PartitionId> = (0..u64::from(partition_count))
            .filter(|i| (*i as usize) % member_count == member_index)
            .map(PartitionId::new)
            .collect();

        debug!(
            group = %group,
            member_id,
            topic,
            partitions = assigned.len(),
            "group member joined"
        );
        Ok(assigned)
    }

    async fn metadata(&self) -> PipelineResult<ClusterMetadata> {
        let state = self.state.lock().await;
        Ok(ClusterMetadata {
            nodes: vec![NodeId::new(1)],
            topics: state
                .topics
                .iter()
                .map(|(name, t)| (name.clone(), t.partition_count))
                .collect(),
        })
    }
}
