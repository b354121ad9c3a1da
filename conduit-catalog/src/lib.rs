//! Conduit Catalog - topic metadata, validated once at startup.
//!
//! The catalog owns every [`TopicDescriptor`] the process knows about.
//! Declaration is idempotent: declaring an identical descriptor twice is a
//! no-op, while redeclaring a topic with different settings is a conflict.
//!
//! This replaces configuration-framework topic registration with an
//! explicit immutable value passed in by the bootstrap routine - there is
//! no ambient mutable global state.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod catalog;
mod descriptor;
mod error;

pub use catalog::TopicCatalog;
pub use descriptor::{CleanupPolicy, TopicDescriptor, TopicDescriptorBuilder};
pub use error::{CatalogError, CatalogResult};
