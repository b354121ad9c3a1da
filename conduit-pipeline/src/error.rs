//! Pipeline error types.

use conduit_core::{ErrorKind, PartitionId};
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No broker could be reached via the bootstrap addresses.
    #[error("no broker reachable via {addresses} bootstrap address(es) after {attempts} attempt(s)")]
    BrokerUnavailable {
        /// Number of bootstrap addresses tried.
        addresses: usize,
        /// Total dial attempts made.
        attempts: u32,
    },

    /// An established connection failed mid-operation.
    #[error("connection to broker lost: {reason}")]
    ConnectionLost {
        /// What broke.
        reason: String,
    },

    /// A batch could not be appended within the retry budget.
    #[error("delivery to {topic}/{partition} failed after {attempts} attempt(s)")]
    DeliveryFailed {
        /// The destination topic.
        topic: String,
        /// The destination partition.
        partition: PartitionId,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Partition assignment did not arrive in time.
    #[error("partition assignment did not arrive within {timeout_ms} ms")]
    AssignmentTimeout {
        /// The configured wait.
        timeout_ms: u64,
    },

    /// The topic has not been provisioned on the broker.
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    /// The topic is already provisioned with a different shape.
    #[error("topic '{topic}' already provisioned with {existing} partition(s)")]
    ProvisionConflict {
        /// The topic.
        topic: String,
        /// The partition count the broker already holds.
        existing: u32,
    },

    /// The partition does not exist on the topic.
    #[error("topic '{topic}' has no partition {partition}")]
    UnknownPartition {
        /// The topic.
        topic: String,
        /// The out-of-range partition.
        partition: PartitionId,
    },

    /// A record exceeds what the topic accepts.
    #[error("record of {size} bytes exceeds the topic limit of {limit} bytes")]
    RecordTooLarge {
        /// Size of the rejected record.
        size: usize,
        /// The topic's limit.
        limit: u32,
    },

    /// The pipeline has been shut down.
    #[error("pipeline is shut down")]
    Shutdown,
}

impl PipelineError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BrokerUnavailable { .. } | Self::Shutdown => ErrorKind::BrokerUnavailable,
            Self::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            Self::DeliveryFailed { .. }
            | Self::UnknownTopic(_)
            | Self::UnknownPartition { .. }
            | Self::RecordTooLarge { .. } => ErrorKind::DeliveryFailed,
            Self::ProvisionConflict { .. } => ErrorKind::TopicConflict,
            Self::AssignmentTimeout { .. } => ErrorKind::AssignmentTimeout,
        }
    }

    /// True if the operation may succeed when retried against a fresh
    /// connection.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. } | Self::BrokerUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = PipelineError::ConnectionLost {
            reason: "peer reset".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
        assert!(err.is_transient());

        let err = PipelineError::UnknownTopic("nope".to_string());
        assert_eq!(err.kind(), ErrorKind::DeliveryFailed);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_display() {
        let err = PipelineError::DeliveryFailed {
            topic: "orders".to_string(),
            partition: PartitionId::new(1),
            attempts: 5,
        };
        let msg = format!("{err}");
        assert!(msg.contains("orders"));
        assert!(msg.contains('5'));
    }
}
