//! External-store aggregation strategy.
//!
//! For inputs too large to merge in memory. Fragments stream into a
//! uniquely named temporary dataset; the store performs the
//! identity-keyed merge and is iterated in merged-entity order, with
//! entities forwarded to the loader in batches. The dataset is dropped
//! on every exit path, success or failure.

use super::AggregationRun;
use crate::bulk::{BulkDataset, BulkStore};
use crate::loader::Loader;
use crate::model::Fragment;
use graphfold_core::Error;

const PROGRESS_EVERY: usize = 10_000;
const LOAD_BATCH: usize = 10_000;

/// Aggregate a fragment sequence through the bulk store.
///
/// Write or flush failure is fatal to the run; output batches already
/// forwarded to the loader remain valid and are not rolled back.
pub async fn aggregate<I>(fragments: I, store: &dyn BulkStore, loader: &dyn Loader) -> Result<AggregationRun, Error>
where
    I: IntoIterator<Item = Fragment>,
{
    let name = format!("aggregate_{}", uuid::Uuid::new_v4().simple());
    let mut dataset = store.create(&name).await?;

    let result = run(dataset.as_mut(), fragments, loader).await;

    // scoped release: cleanup happens whether or not the pass succeeded
    if let Err(e) = dataset.drop_data().await {
        tracing::warn!("failed to drop bulk dataset {}: {}", name, e);
    }

    result
}

async fn run<I>(dataset: &mut dyn BulkDataset, fragments: I, loader: &dyn Loader) -> Result<AggregationRun, Error>
where
    I: IntoIterator<Item = Fragment>,
{
    let mut read = 0usize;
    for fragment in fragments {
        if fragment.id.is_none() {
            tracing::warn!("skipping fragment: {}", Error::InvalidFragment("fragment has no id".into()));
            continue;
        }
        if read % PROGRESS_EVERY == 0 {
            tracing::info!("write [{}]: {} fragments", dataset.name(), read);
        }
        dataset.put(&fragment, &read.to_string()).await?;
        read += 1;
    }
    dataset.flush().await?;

    let mut rx = dataset.iterate().await?;
    let mut batch = Vec::with_capacity(LOAD_BATCH);
    let mut written = 0usize;
    while let Some(entity) = rx.recv().await {
        batch.push(entity?);
        if batch.len() >= LOAD_BATCH {
            written += loader.load(&batch, true).await?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        written += loader.load(&batch, true).await?;
    }

    Ok(AggregationRun { fragments_read: read, entities_written: written })
}
