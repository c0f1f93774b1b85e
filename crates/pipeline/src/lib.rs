//! Fragment aggregation and pipeline stage wiring for graphfold.
//!
//! This crate provides:
//! - The Fragment/Entity model with a total, order-independent merge
//! - Two interchangeable aggregation strategies (in-memory and
//!   external-store)
//! - The loader and bulk-store collaborator traits with concrete
//!   implementations
//! - Channel-based stage wiring with claim-once handoff through the
//!   ephemeral cache

pub mod aggregate;
pub mod bulk;
pub mod loader;
pub mod model;
pub mod stages;

pub use aggregate::{AggregationRun, Strategy};
pub use bulk::{BulkDataset, BulkStore, SqliteBulkStore};
pub use loader::{JsonLinesLoader, Loader, MemoryLoader};
pub use model::{Entity, Fragment};
pub use stages::{RunContext, Transform, TransformRegistry};
