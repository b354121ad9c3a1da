//! System limits and configuration bounds.
//!
//! Put limits on everything: every queue, buffer, and resource has an
//! explicit maximum size. This prevents unbounded growth and makes the
//! pipeline predictable under load.

/// System-wide limits for Conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Record and batch limits.
    /// Maximum size of a single record in bytes.
    pub max_record_bytes: u32,
    /// Maximum size of a batch in bytes.
    pub max_batch_bytes: u32,
    /// Maximum number of records in a batch.
    pub max_records_per_batch: u32,

    // Topic limits.
    /// Maximum number of partitions per topic.
    pub max_partitions_per_topic: u32,
    /// Maximum length of a topic name in bytes.
    pub max_topic_name_len: u32,

    // Pipeline limits.
    /// Maximum number of records queued in the delivery pipeline.
    pub max_pending_records: u32,
    /// Maximum number of broker connections held by one pool.
    pub max_connections: u32,

    // Consumer limits.
    /// Maximum records returned by a single poll.
    pub max_poll_records: u32,
    /// Maximum consumers per group.
    pub max_consumers_per_group: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    ///
    /// `max_record_bytes` defaults to 1_000_012 - the broker default for
    /// `max.message.bytes` - so a record accepted here is accepted there.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_record_bytes: 1_000_012,
            max_batch_bytes: 16 * 1024 * 1024,
            max_records_per_batch: 10_000,

            max_partitions_per_topic: 256,
            max_topic_name_len: 249,

            max_pending_records: 100_000,
            max_connections: 64,

            max_poll_records: 10_000,
            max_consumers_per_group: 100,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns [`crate::ErrorKind::InvalidTopicConfig`] if any limit is
    /// zero or inconsistent.
    pub fn validate(&self) -> Result<(), crate::ErrorKind> {
        if self.max_record_bytes == 0 {
            return Err(crate::ErrorKind::InvalidTopicConfig);
        }

        // A batch must hold at least one full record.
        if self.max_batch_bytes < self.max_record_bytes {
            return Err(crate::ErrorKind::InvalidTopicConfig);
        }

        if self.max_partitions_per_topic == 0 || self.max_topic_name_len == 0 {
            return Err(crate::ErrorKind::InvalidTopicConfig);
        }

        if self.max_pending_records == 0 || self.max_poll_records == 0 {
            return Err(crate::ErrorKind::InvalidTopicConfig);
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_valid() {
        let limits = Limits::new();
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_zero_record_size_rejected() {
        let mut limits = Limits::new();
        limits.max_record_bytes = 0;
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_batch_smaller_than_record_rejected() {
        let mut limits = Limits::new();
        limits.max_batch_bytes = 512;
        limits.max_record_bytes = 1024;
        assert!(limits.validate().is_err());
    }
}
