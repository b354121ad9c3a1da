//! Conduit Core - Shared types for the Conduit publish/consume pipeline.
//!
//! This crate provides the vocabulary every other Conduit crate speaks:
//! records and offsets, strongly-typed identifiers, resource limits, and
//! the error-kind taxonomy surfaced to callers.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: prevent mixing up a `NodeId` with a `PartitionId`
//! - **Explicit limits**: every resource has a bounded maximum
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod record;
mod types;

pub use error::ErrorKind;
pub use limits::Limits;
pub use record::{DeliveryAcknowledgment, Offset, Record, Timestamp};
pub use types::{GroupId, NodeId, PartitionId};
