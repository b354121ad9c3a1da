//! Record types for the Conduit pipeline.
//!
//! A record is the unit of publish and consume: an optional key (used for
//! partition selection), an opaque value, a timestamp, and - once the
//! broker has appended it - a partition-local offset.
//!
//! Records are immutable after being handed to the delivery pipeline; the
//! only field the broker fills in is the offset, which happens on the
//! broker's copy before it is ever visible to a consumer.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::{ErrorKind, PartitionId};

/// Timestamp in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Millis won't overflow i64 for centuries.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

/// Offset in a partition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw offset value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the offset for the beginning of a log.
    #[must_use]
    pub const fn earliest() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Offset in the partition (assigned by the broker, 0 until appended).
    pub offset: Offset,
    /// Timestamp of the record.
    pub timestamp: Timestamp,
    /// Optional key, used for deterministic partition selection.
    pub key: Option<Bytes>,
    /// The record value/payload.
    pub value: Bytes,
}

impl Record {
    /// Creates a new record with just a value.
    #[must_use]
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            offset: Offset::default(),
            timestamp: Timestamp::now(),
            key: None,
            value: value.into(),
        }
    }

    /// Creates a new record with key and value.
    #[must_use]
    pub fn with_key(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            offset: Offset::default(),
            timestamp: Timestamp::now(),
            key: Some(key.into()),
            value: value.into(),
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the approximate size of the record in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let key_size = self.key.as_ref().map_or(0, Bytes::len);
        8 + 8 + 4 + key_size + 4 + self.value.len()
    }
}

/// Confirmation that a record was (or could not be) durably appended.
///
/// The delivery pipeline produces exactly one acknowledgment per record
/// handed to it; the producer's completion future resolves with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAcknowledgment {
    /// The partition the record was routed to.
    pub partition: PartitionId,
    /// Offset assigned by the broker (0 when `success` is false).
    pub offset: Offset,
    /// Whether the record was durably appended.
    pub success: bool,
    /// Failure classification when `success` is false.
    pub error: Option<ErrorKind>,
}

impl DeliveryAcknowledgment {
    /// Acknowledgment for a successful append.
    #[must_use]
    pub const fn appended(partition: PartitionId, offset: Offset) -> Self {
        Self {
            partition,
            offset,
            success: true,
            error: None,
        }
    }

    /// Acknowledgment for a failed delivery.
    #[must_use]
    pub const fn failed(partition: PartitionId, kind: ErrorKind) -> Self {
        Self {
            partition,
            offset: Offset::new(0),
            success: false,
            error: Some(kind),
        }
    }
}
