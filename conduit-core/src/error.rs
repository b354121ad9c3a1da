//! The error-kind taxonomy surfaced to Conduit callers.
//!
//! Each crate in the workspace has its own richer error type; all of them
//! map onto these kinds so that callers (and acknowledgments crossing the
//! pipeline boundary) can classify failures without knowing which layer
//! produced them.

use std::fmt;

/// Classification of a Conduit failure.
///
/// Transient kinds (`ConnectionLost`) are retried internally up to a bound;
/// the remaining kinds are terminal from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A topic descriptor failed validation.
    InvalidTopicConfig,
    /// A topic was redeclared with conflicting settings.
    TopicConflict,
    /// A send exhausted its retry budget without an acknowledgment.
    DeliveryFailed,
    /// Joining a consumer group did not produce an assignment in time.
    AssignmentTimeout,
    /// The consumer callback reported a failure.
    ProcessingError,
    /// A single broker connection dropped; retried internally.
    ConnectionLost,
    /// Every broker node is unreachable.
    BrokerUnavailable,
}

impl ErrorKind {
    /// Returns true if the failure is worth retrying internally.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ConnectionLost)
    }

    /// Short stable name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTopicConfig => "invalid_topic_config",
            Self::TopicConflict => "topic_conflict",
            Self::DeliveryFailed => "delivery_failed",
            Self::AssignmentTimeout => "assignment_timeout",
            Self::ProcessingError => "processing_error",
            Self::ConnectionLost => "connection_lost",
            Self::BrokerUnavailable => "broker_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopicConfig => write!(f, "invalid topic configuration"),
            Self::TopicConflict => write!(f, "conflicting topic declaration"),
            Self::DeliveryFailed => write!(f, "delivery failed after retries were exhausted"),
            Self::AssignmentTimeout => write!(f, "timed out waiting for partition assignment"),
            Self::ProcessingError => write!(f, "message callback failed"),
            Self::ConnectionLost => write!(f, "broker connection lost"),
            Self::BrokerUnavailable => write!(f, "no broker node is reachable"),
        }
    }
}

impl std::error::Error for ErrorKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ErrorKind::ConnectionLost.is_transient());
        assert!(!ErrorKind::DeliveryFailed.is_transient());
        assert!(!ErrorKind::BrokerUnavailable.is_transient());
        assert!(!ErrorKind::ProcessingError.is_transient());
    }

    #[test]
    fn test_display() {
        let msg = format!("{}", ErrorKind::DeliveryFailed);
        assert!(msg.contains("retries"));
        assert_eq!(ErrorKind::AssignmentTimeout.as_str(), "assignment_timeout");
    }
}
