//! Fragment aggregation.
//!
//! Two interchangeable strategies with one contract: consume a sequence
//! of fragments, forward every merged entity to the loader, and report
//! how many fragments were read and entities written. Merging is
//! commutative and associative per id, so both strategies produce the
//! same logical result for the same input regardless of arrival order.

pub mod bulk;
pub mod memory;
pub mod sources;

use crate::bulk::BulkStore;
use crate::loader::Loader;
use crate::model::Fragment;
use graphfold_core::Error;

/// Counters from one aggregation pass. Owned by the invocation that
/// produced it; discarded after being reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationRun {
    pub fragments_read: usize,
    pub entities_written: usize,
}

/// The registered aggregation strategies, resolved by name at
/// configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Merge in a process-memory map. Fast, but unsuitable once the
    /// distinct-entity set no longer fits in memory (no spilling).
    InMemory,
    /// Offload merging to an external bulk-loadable store.
    External,
}

impl Strategy {
    /// Resolve a configured strategy name.
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "memory" | "in_memory" => Some(Self::InMemory),
            "bulk" | "external" => Some(Self::External),
            _ => None,
        }
    }

    /// Run this strategy over a fragment sequence.
    pub async fn run<I>(
        &self,
        fragments: I,
        loader: &dyn Loader,
        store: &dyn BulkStore,
        chunk_size: usize,
    ) -> Result<AggregationRun, Error>
    where
        I: IntoIterator<Item = Fragment> + Send,
        I::IntoIter: Send,
    {
        match self {
            Self::InMemory => memory::aggregate(fragments, loader, chunk_size).await,
            Self::External => bulk::aggregate(fragments, store, loader).await,
        }
    }
}
