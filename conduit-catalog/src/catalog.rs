//! The topic catalog.

use std::collections::HashMap;

use conduit_core::Limits;
use tracing::{debug, warn};

use crate::descriptor::TopicDescriptor;
use crate::error::{CatalogError, CatalogResult};

/// Registry of every topic the process has declared.
///
/// Declarations are validated against the catalog's [`Limits`] and stored
/// by name. Redeclaring a topic with an identical descriptor is a no-op;
/// redeclaring it with different settings fails with
/// [`CatalogError::TopicConflict`] naming the first differing field.
#[derive(Debug)]
pub struct TopicCatalog {
    limits: Limits,
    topics: HashMap<String, TopicDescriptor>,
}

impl TopicCatalog {
    /// Creates an empty catalog with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(Limits::new())
    }

    /// Creates an empty catalog with the given limits.
    #[must_use]
    pub fn with_limits(limits: Limits) -> Self {
        Self {
            limits,
            topics: HashMap::new(),
        }
    }

    /// Declares a topic.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidTopicConfig`] if the descriptor fails
    /// validation, or [`CatalogError::TopicConflict`] if the topic was
    /// already declared with different settings.
    pub fn declare(&mut self, descriptor: TopicDescriptor) -> CatalogResult<()> {
        descriptor.validate(&self.limits)?;

        if let Some(existing) = self.topics.get(&descriptor.name) {
            return match existing.first_difference(&descriptor) {
                None => {
                    debug!(topic = %descriptor.name, "topic already declared, no-op");
                    Ok(())
                }
                Some(field) => {
                    warn!(
                        topic = %descriptor.name,
                        field,
                        "conflicting topic redeclaration"
                    );
                    Err(CatalogError::TopicConflict {
                        topic: descriptor.name.clone(),
                        field,
                    })
                }
            };
        }

        debug!(
            topic = %descriptor.name,
            partitions = descriptor.partition_count,
            replicas = descriptor.replication_factor,
            cleanup = descriptor.cleanup.as_str(),
            "topic declared"
        );
        self.topics.insert(descriptor.name.clone(), descriptor);

        // Postcondition: the topic is now present.
        debug_assert!(!self.topics.is_empty());

        Ok(())
    }

    /// Looks up a declared topic by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TopicDescriptor> {
        self.topics.get(name)
    }

    /// Returns true if the topic has been declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// Iterates over all declared descriptors, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &TopicDescriptor> {
        self.topics.values()
    }

    /// Number of declared topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Returns true if no topics have been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// The limits this catalog validates against.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::new()
    }
}
