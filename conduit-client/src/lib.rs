//! Conduit Client - the producer and consumer built on the pipeline.
//!
//! [`Producer`] routes records to partitions (stable key hash, or
//! round-robin for keyless records) and resolves one acknowledgment per
//! send. [`Consumer`] runs a dedicated poll loop per instance: join the
//! group, poll assigned partitions in offset order, invoke the handler
//! once per record, and commit only after the handler succeeds.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod consumer;
mod error;
mod producer;

pub use consumer::{
    Consumer, ConsumerConfig, ConsumerState, Delivery, FailurePolicy, MessageHandler,
};
pub use error::{ClientError, ClientResult};
pub use producer::{Partitioner, Producer, ProducerConfig};
