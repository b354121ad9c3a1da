//! Conduit Pipeline - broker connections, batching, and record delivery.
//!
//! The pipeline sits between the client-facing producer/consumer API and
//! the broker. It owns the connection pool built from bootstrap addresses,
//! accumulates outgoing records into per-partition batches, retries
//! transient failures with bounded exponential backoff, and produces
//! exactly one [`DeliveryAcknowledgment`](conduit_core::DeliveryAcknowledgment)
//! per record handed to it.
//!
//! Broker access goes through the [`BrokerLink`] trait so the same
//! pipeline drives a real cluster or the in-process [`MemoryCluster`]
//! used by tests and demos.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod batcher;
mod broker;
mod connection;
mod error;
mod memory;
mod pipeline;

pub use batcher::{DeliveryConfig, DeliveryHandle, RetryPolicy};
pub use broker::{BrokerLink, ClusterMetadata, Connector};
pub use connection::ConnectionPool;
pub use error::{PipelineError, PipelineResult};
pub use memory::MemoryCluster;
pub use pipeline::{DeliveryPipeline, PipelineConfig};
