//! Strongly-typed identifiers for Conduit entities.
//!
//! Explicit types prevent bugs from mixing up IDs. Numeric IDs are 64-bit;
//! consumer groups are identified by a validated string, matching how
//! brokers address them on the wire.

use std::fmt;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `NodeId` with `PartitionId`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(NodeId, "node", "Unique identifier for a broker node in the cluster.");
define_id!(PartitionId, "partition", "Unique identifier for a partition within a topic.");

/// Identity of a consumer group.
///
/// Group IDs are carried as strings end to end (they come from process
/// configuration and name broker-side offset state), so unlike the numeric
/// IDs above this is a validated string newtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Creates a group ID.
    ///
    /// # Errors
    /// Returns [`crate::ErrorKind::InvalidTopicConfig`] if the ID is empty
    /// or contains characters other than alphanumerics, `-`, `_`, and `.`.
    pub fn new(id: impl Into<String>) -> Result<Self, crate::ErrorKind> {
        let id = id.into();
        if id.is_empty() || id.len() > 255 {
            return Err(crate::ErrorKind::InvalidTopicConfig);
        }
        if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.') {
            return Err(crate::ErrorKind::InvalidTopicConfig);
        }
        Ok(Self(id))
    }

    /// Returns the group ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let node = NodeId::new(1);
        let partition = PartitionId::new(1);

        // Same raw value, different types.
        assert_eq!(node.get(), partition.get());
    }

    #[test]
    fn test_id_display() {
        let node = NodeId::new(42);
        assert_eq!(format!("{node}"), "node-42");
        assert_eq!(format!("{node:?}"), "node(42)");
    }

    #[test]
    fn test_group_id_validation() {
        assert!(GroupId::new("my-group-id").is_ok());
        assert!(GroupId::new("group.7_a").is_ok());
        assert!(GroupId::new("").is_err());
        assert!(GroupId::new("has spaces").is_err());
        assert!(GroupId::new("bad@group").is_err());
    }

    #[test]
    fn test_group_id_display() {
        let group = GroupId::new("orders").unwrap();
        assert_eq!(group.as_str(), "orders");
        assert_eq!(format!("{group}"), "orders");
    }
}
