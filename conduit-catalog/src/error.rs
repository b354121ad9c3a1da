//! Catalog error types.

use conduit_core::ErrorKind;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A descriptor field failed validation.
    InvalidTopicConfig {
        /// The field that failed.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// A topic was redeclared with different settings.
    TopicConflict {
        /// The topic name.
        topic: String,
        /// The first field found to differ.
        field: &'static str,
    },
}

impl CatalogError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTopicConfig { .. } => ErrorKind::InvalidTopicConfig,
            Self::TopicConflict { .. } => ErrorKind::TopicConflict,
        }
    }
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTopicConfig { field, reason } => {
                write!(f, "invalid topic config '{field}': {reason}")
            }
            Self::TopicConflict { topic, field } => {
                write!(f, "topic '{topic}' already declared with different {field}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}
