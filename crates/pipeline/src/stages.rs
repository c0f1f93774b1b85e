//! Pipeline stage wiring with claim-once handoff.
//!
//! Stages form an explicit task graph connected by bounded channels.
//! Payloads never travel through the channels: a stage writes its batch
//! into the ephemeral cache and sends only the returned key downstream;
//! the next stage claims the batch, consuming the key. That claim-once
//! read is the single synchronization point guaranteeing exactly one
//! consumer observes a batch; no other locking exists or is needed.

use crate::loader::Loader;
use crate::model::{Entity, Fragment};
use graphfold_core::{EphemeralCache, Error};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 8;

/// Per-run state: an explicitly constructed cache handle plus run
/// parameters, passed through instead of hidden process-wide state.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub cache: EphemeralCache,
    pub chunk_size: usize,
}

impl RunContext {
    pub fn new(cache: EphemeralCache, chunk_size: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            cache,
            chunk_size: chunk_size.max(1),
        }
    }
}

/// Turns one extracted record into entity fragments.
pub trait Transform: Send + Sync {
    fn transform(&self, record: &Value) -> Result<Vec<Fragment>, Error>;
}

/// Named table of transform implementations, resolved at configuration
/// time instead of loading functions from path strings at runtime.
#[derive(Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, transform: Arc<dyn Transform>) {
        self.transforms.insert(name.into(), transform);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }
}

/// Counters from one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineRun {
    pub records_extracted: usize,
    pub fragments_loaded: usize,
}

/// Run the extract → transform → load graph over a record sequence.
///
/// The producer batches records into the cache and sends keys; the
/// transform stage claims each batch, applies the transform, and hands
/// the resulting fragments on under a new key; the load stage claims
/// those and forwards them to the loader. A batch claimed by nobody
/// (consumer cancelled) simply expires with the backing store.
pub async fn run_pipeline<I>(
    ctx: &RunContext,
    records: I,
    transform: Arc<dyn Transform>,
    loader: Arc<dyn Loader>,
) -> Result<PipelineRun, Error>
where
    I: IntoIterator<Item = Value>,
{
    let (batch_tx, mut batch_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (frag_tx, mut frag_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let transform_cache = ctx.cache.clone();
    let transform_task = tokio::spawn(async move {
        while let Some(key) = batch_rx.recv().await {
            let Some(records) = transform_cache.get::<Vec<Value>>(&key, true).await? else {
                // already claimed elsewhere
                continue;
            };
            let mut fragments = Vec::new();
            for record in &records {
                fragments.extend(transform.transform(record)?);
            }
            tracing::info!("transformed {} records", records.len());
            let out_key = transform_cache.set(&fragments, None).await?;
            if frag_tx.send(out_key).await.is_err() {
                break;
            }
        }
        Ok::<(), Error>(())
    });

    let load_cache = ctx.cache.clone();
    let load_task = tokio::spawn(async move {
        let mut loaded = 0usize;
        while let Some(key) = frag_rx.recv().await {
            let Some(fragments) = load_cache.get::<Vec<Fragment>>(&key, true).await? else {
                continue;
            };
            let mut entities = Vec::with_capacity(fragments.len());
            for fragment in &fragments {
                match Entity::from_fragment(fragment) {
                    Ok(entity) => entities.push(entity),
                    Err(e) => tracing::warn!("skipping fragment: {}", e),
                }
            }
            loaded += loader.load(&entities, true).await?;
            tracing::info!("loaded {} fragments", entities.len());
        }
        Ok::<usize, Error>(loaded)
    });

    let mut extracted = 0usize;
    let mut batch: Vec<Value> = Vec::with_capacity(ctx.chunk_size);
    for record in records {
        extracted += 1;
        batch.push(record);
        if batch.len() == ctx.chunk_size {
            let key = ctx.cache.set(&batch, None).await?;
            batch.clear();
            if batch_tx.send(key).await.is_err() {
                break;
            }
        }
    }
    if !batch.is_empty() {
        let key = ctx.cache.set(&batch, None).await?;
        let _ = batch_tx.send(key).await;
    }
    drop(batch_tx);
    tracing::info!("extracted {} records", extracted);

    transform_task
        .await
        .map_err(|e| Error::Stage(e.to_string()))??;
    let fragments_loaded = load_task.await.map_err(|e| Error::Stage(e.to_string()))??;

    Ok(PipelineRun { records_extracted: extracted, fragments_loaded })
}
