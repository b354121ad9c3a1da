//! Conduit Tests - integration tests for the publish/consume pipeline.
//!
//! Tests are organized by component:
//! - `catalog_tests`: topic declaration and validation
//! - `pipeline_tests`: delivery retry, backoff, and connection failover
//! - `client_tests`: producer routing, consumer ordering, and commits
//! - `scenarios`: end-to-end publish/consume flows with fault injection
//!
//! Support lives in `harness`: cluster/pipeline setup and a collecting
//! message handler.
//!
//! Unit tests stay inline in each crate under `#[cfg(test)]`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod harness;

#[cfg(test)]
mod client_tests;
#[cfg(test)]
mod scenarios;
