//! Topic descriptors.
//!
//! A descriptor captures everything the broker needs to provision a topic:
//! partition count, replication factor, retention, cleanup policy, and the
//! largest record it will accept. Descriptors are immutable once built.

use conduit_core::Limits;

use crate::error::{CatalogError, CatalogResult};

/// How expired data is removed from a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Delete records older than the retention window.
    #[default]
    Delete,
    /// Keep only the latest record per key.
    Compact,
}

impl CleanupPolicy {
    /// Stable name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Compact => "compact",
        }
    }
}

/// Immutable description of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescriptor {
    /// Topic name.
    pub name: String,
    /// Number of partitions, >= 1.
    pub partition_count: u32,
    /// Number of replicas per partition, >= 1.
    pub replication_factor: u32,
    /// Retention window in milliseconds. Zero keeps nothing past delivery.
    pub retention_ms: u64,
    /// Largest record the topic accepts, in bytes, > 0.
    pub max_message_bytes: u32,
    /// Cleanup policy for expired data.
    pub cleanup: CleanupPolicy,
}

impl TopicDescriptor {
    /// Starts building a descriptor for the named topic.
    ///
    /// Defaults match the broker's: one partition, one replica, 2.4 hours
    /// of retention, 1_000_012-byte records, delete cleanup.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TopicDescriptorBuilder {
        TopicDescriptorBuilder {
            name: name.into(),
            partition_count: 1,
            replication_factor: 1,
            retention_ms: 8_640_000,
            max_message_bytes: 1_000_012,
            cleanup: CleanupPolicy::Delete,
        }
    }

    /// Validates the descriptor against system limits.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidTopicConfig`] naming the first field
    /// that fails.
    pub fn validate(&self, limits: &Limits) -> CatalogResult<()> {
        if self.name.is_empty() {
            return Err(CatalogError::InvalidTopicConfig {
                field: "name",
                reason: "must not be empty",
            });
        }
        if self.name.len() > limits.max_topic_name_len as usize {
            return Err(CatalogError::InvalidTopicConfig {
                field: "name",
                reason: "exceeds maximum length",
            });
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(CatalogError::InvalidTopicConfig {
                field: "name",
                reason: "contains invalid characters",
            });
        }
        if self.partition_count == 0 {
            return Err(CatalogError::InvalidTopicConfig {
                field: "partition_count",
                reason: "must be >= 1",
            });
        }
        if self.partition_count > limits.max_partitions_per_topic {
            return Err(CatalogError::InvalidTopicConfig {
                field: "partition_count",
                reason: "exceeds maximum partitions per topic",
            });
        }
        if self.replication_factor == 0 {
            return Err(CatalogError::InvalidTopicConfig {
                field: "replication_factor",
                reason: "must be >= 1",
            });
        }
        if self.max_message_bytes == 0 {
            return Err(CatalogError::InvalidTopicConfig {
                field: "max_message_bytes",
                reason: "must be > 0",
            });
        }
        if self.max_message_bytes > limits.max_record_bytes {
            return Err(CatalogError::InvalidTopicConfig {
                field: "max_message_bytes",
                reason: "exceeds maximum record size",
            });
        }

        Ok(())
    }

    /// Returns the name of the first field differing from `other`, if any.
    ///
    /// Used to report which setting a conflicting redeclaration changed.
    #[must_use]
    pub fn first_difference(&self, other: &Self) -> Option<&'static str> {
        if self.partition_count != other.partition_count {
            return Some("partition_count");
        }
        if self.replication_factor != other.replication_factor {
            return Some("replication_factor");
        }
        if self.retention_ms != other.retention_ms {
            return Some("retention_ms");
        }
        if self.max_message_bytes != other.max_message_bytes {
            return Some("max_message_bytes");
        }
        if self.cleanup != other.cleanup {
            return Some("cleanup");
        }
        None
    }
}

/// Builder for [`TopicDescriptor`].
#[derive(Debug, Clone)]
pub struct TopicDescriptorBuilder {
    name: String,
    partition_count: u32,
    replication_factor: u32,
    retention_ms: u64,
    max_message_bytes: u32,
    cleanup: CleanupPolicy,
}

impl TopicDescriptorBuilder {
    /// Sets the partition count.
    #[must_use]
    pub const fn partitions(mut self, count: u32) -> Self {
        self.partition_count = count;
        self
    }

    /// Sets the replication factor.
    #[must_use]
    pub const fn replicas(mut self, count: u32) -> Self {
        self.replication_factor = count;
        self
    }

    /// Sets the retention window in milliseconds.
    #[must_use]
    pub const fn retention_ms(mut self, millis: u64) -> Self {
        self.retention_ms = millis;
        self
    }

    /// Sets the maximum record size in bytes.
    #[must_use]
    pub const fn max_message_bytes(mut self, bytes: u32) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Sets the cleanup policy.
    #[must_use]
    pub const fn cleanup(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup = policy;
        self
    }

    /// Builds the descriptor without validating it; validation happens at
    /// declaration time against the catalog's limits.
    #[must_use]
    pub fn build(self) -> TopicDescriptor {
        TopicDescriptor {
            name: self.name,
            partition_count: self.partition_count,
            replication_factor: self.replication_factor,
            retention_ms: self.retention_ms,
            max_message_bytes: self.max_message_bytes,
            cleanup: self.cleanup,
        }
    }
}
