//! Client error types.

use conduit_core::{ErrorKind, Offset, PartitionId};
use conduit_pipeline::PipelineError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Producer and consumer errors.
#[derive(Debug)]
pub enum ClientError {
    /// The underlying pipeline failed.
    Pipeline(PipelineError),
    /// The message handler kept failing on one record until the retry
    /// policy ran out.
    Processing {
        /// The topic being consumed.
        topic: String,
        /// The partition the record came from.
        partition: PartitionId,
        /// The offset of the record the handler could not process.
        offset: Offset,
        /// Handler invocations made for this record.
        attempts: u32,
    },
}

impl ClientError {
    /// Classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Pipeline(inner) => inner.kind(),
            Self::Processing { .. } => ErrorKind::ProcessingError,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipeline(inner) => write!(f, "pipeline error: {inner}"),
            Self::Processing {
                topic,
                partition,
                offset,
                attempts,
            } => write!(
                f,
                "handler failed on {topic}/{partition} offset {offset} after {attempts} attempt(s)"
            ),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pipeline(inner) => Some(inner),
            Self::Processing { .. } => None,
        }
    }
}

impl From<PipelineError> for ClientError {
    fn from(error: PipelineError) -> Self {
        Self::Pipeline(error)
    }
}
