//! The loader collaborator.
//!
//! Aggregation strategies forward merged entities here in batches; what
//! persistence means is the implementation's business.

use crate::model::Entity;
use async_trait::async_trait;
use graphfold_core::Error;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// Persists batches of merged entities.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Persist a batch; returns the number of entities written.
    ///
    /// With `serialize` the loader encodes the entities itself; without
    /// it the caller has already produced a serialized form and the
    /// loader only appends.
    async fn load(&self, entities: &[Entity], serialize: bool) -> Result<usize, Error>;
}

/// Appends entities as JSON lines to a file.
pub struct JsonLinesLoader {
    path: PathBuf,
}

impl JsonLinesLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Loader for JsonLinesLoader {
    async fn load(&self, entities: &[Entity], _serialize: bool) -> Result<usize, Error> {
        let mut out = Vec::new();
        for entity in entities {
            serde_json::to_writer(&mut out, entity).map_err(|e| Error::CacheDecode(e.to_string()))?;
            out.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::BulkStore(format!("open {}: {}", self.path.display(), e)))?;
        file.write_all(&out)
            .await
            .map_err(|e| Error::BulkStore(format!("write {}: {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| Error::BulkStore(format!("flush {}: {}", self.path.display(), e)))?;

        Ok(entities.len())
    }
}

/// Collects entities in memory. Test collaborator.
#[derive(Default)]
pub struct MemoryLoader {
    entities: Mutex<Vec<Entity>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.entities.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn load(&self, entities: &[Entity], _serialize: bool) -> Result<usize, Error> {
        self.entities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(entities.iter().cloned());
        Ok(entities.len())
    }
}
