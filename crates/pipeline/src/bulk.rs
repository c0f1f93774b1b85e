//! The bulk store collaborator.
//!
//! The external-store aggregation strategy offloads identity-keyed
//! merging to a bulk-loadable store: fragments are streamed in tagged
//! with their sequence index, flushed in bulk, and read back merged in
//! entity order. A dataset is a temporary named collection owned by
//! exactly one aggregation pass; its name must be unique per pass and it
//! is dropped when the pass ends.

use crate::model::{Entity, Fragment};
use async_trait::async_trait;
use graphfold_core::Error;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_rusqlite::{Connection, params};

const WRITE_BUFFER: usize = 10_000;
const ITERATE_CAPACITY: usize = 256;

/// Creates temporary bulk datasets by name.
#[async_trait]
pub trait BulkStore: Send + Sync {
    async fn create(&self, name: &str) -> Result<Box<dyn BulkDataset>, Error>;
}

/// A temporary bulk-loadable collection of tagged fragments.
#[async_trait]
pub trait BulkDataset: Send + Sync {
    fn name(&self) -> &str;

    /// Stage a fragment under its sequence tag. May buffer; `flush`
    /// makes everything durable.
    async fn put(&mut self, fragment: &Fragment, tag: &str) -> Result<(), Error>;

    /// Flush all buffered fragments to the store.
    async fn flush(&mut self) -> Result<(), Error>;

    /// Iterate the store's identity-keyed merge: fragments grouped by
    /// id, properties unioned, delivered in merged-entity order.
    async fn iterate(&self) -> Result<mpsc::Receiver<Result<Entity, Error>>, Error>;

    /// Drop the dataset and release its storage.
    async fn drop_data(&mut self) -> Result<(), Error>;
}

/// SQLite-backed bulk store: one database file per dataset under the
/// configured storage root, or in-memory datasets for development.
pub struct SqliteBulkStore {
    root: Option<PathBuf>,
}

impl SqliteBulkStore {
    /// Datasets live as `<name>.sqlite` files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    /// Every dataset is an isolated in-memory database.
    pub fn in_memory() -> Self {
        Self { root: None }
    }
}

#[async_trait]
impl BulkStore for SqliteBulkStore {
    async fn create(&self, name: &str) -> Result<Box<dyn BulkDataset>, Error> {
        let (conn, path) = match &self.root {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| Error::BulkStore(format!("create {}: {}", root.display(), e)))?;
                let path = root.join(format!("{name}.sqlite"));
                let conn = Connection::open(&path)
                    .await
                    .map_err(|e| Error::BulkStore(e.to_string()))?;
                (conn, Some(path))
            }
            None => {
                let conn = Connection::open_in_memory()
                    .await
                    .map_err(|e| Error::BulkStore(e.to_string()))?;
                (conn, None)
            }
        };

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 CREATE TABLE IF NOT EXISTS fragments (
                     tag TEXT NOT NULL,
                     id TEXT NOT NULL,
                     schema TEXT,
                     properties TEXT NOT NULL,
                     refs TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_fragments_id ON fragments(id);",
            )?;
            Ok(())
        })
        .await
        .map_err(|e: tokio_rusqlite::Error| Error::BulkStore(e.to_string()))?;

        Ok(Box::new(SqliteBulkDataset {
            name: name.to_string(),
            conn,
            path,
            buffer: Vec::new(),
        }))
    }
}

struct SqliteBulkDataset {
    name: String,
    conn: Connection,
    path: Option<PathBuf>,
    buffer: Vec<(String, Fragment)>,
}

#[async_trait]
impl BulkDataset for SqliteBulkDataset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&mut self, fragment: &Fragment, tag: &str) -> Result<(), Error> {
        self.buffer.push((tag.to_string(), fragment.clone()));
        if self.buffer.len() >= WRITE_BUFFER {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO fragments (tag, id, schema, properties, refs)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for (tag, fragment) in &batch {
                        let id = fragment
                            .id
                            .as_deref()
                            .ok_or_else(|| Error::InvalidFragment(format!("fragment {tag} has no id")))?;
                        let properties = serde_json::to_string(&fragment.properties)
                            .map_err(|e| Error::BulkStore(e.to_string()))?;
                        let refs = serde_json::to_string(&fragment.references)
                            .map_err(|e| Error::BulkStore(e.to_string()))?;
                        stmt.execute(params![tag, id, &fragment.schema, properties, refs])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| match Error::from(e) {
                invalid @ Error::InvalidFragment(_) => invalid,
                other => Error::BulkStore(other.to_string()),
            })
    }

    async fn iterate(&self) -> Result<mpsc::Receiver<Result<Entity, Error>>, Error> {
        let (tx, rx) = mpsc::channel(ITERATE_CAPACITY);
        let conn = self.conn.clone();
        let fail_tx = tx.clone();

        tokio::spawn(async move {
            let result = conn
                .call(move |conn| -> Result<(), Error> {
                    let mut stmt =
                        conn.prepare("SELECT id, schema, properties, refs FROM fragments ORDER BY id")?;
                    let mut rows = stmt.query([])?;
                    let mut current: Option<Entity> = None;

                    while let Some(row) = rows.next()? {
                        let id: String = row.get(0)?;
                        let fragment = Fragment {
                            id: Some(id.clone()),
                            schema: row.get(1)?,
                            properties: serde_json::from_str(&row.get::<_, String>(2)?)
                                .map_err(|e| Error::BulkStore(e.to_string()))?,
                            references: serde_json::from_str(&row.get::<_, String>(3)?)
                                .map_err(|e| Error::BulkStore(e.to_string()))?,
                        };

                        match current.take() {
                            Some(mut entity) if entity.id == id => {
                                entity.merge(&fragment);
                                current = Some(entity);
                            }
                            done => {
                                if let Some(done) = done
                                    && tx.blocking_send(Ok(done)).is_err()
                                {
                                    // receiver hung up, stop iterating
                                    return Ok(());
                                }
                                current = Some(Entity::from_fragment(&fragment)?);
                            }
                        }
                    }

                    if let Some(done) = current.take() {
                        let _ = tx.blocking_send(Ok(done));
                    }
                    Ok(())
                })
                .await;

            if let Err(e) = result {
                let _ = fail_tx.send(Err(Error::BulkStore(e.to_string()))).await;
            }
        });

        Ok(rx)
    }

    async fn drop_data(&mut self) -> Result<(), Error> {
        self.buffer.clear();
        self.conn
            .call(|conn| {
                conn.execute("DROP TABLE IF EXISTS fragments", [])?;
                Ok(())
            })
            .await
            .map_err(|e: tokio_rusqlite::Error| Error::BulkStore(e.to_string()))?;

        if let Some(path) = &self.path {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = path.as_os_str().to_os_string();
                file.push(suffix);
                let _ = tokio::fs::remove_file(PathBuf::from(file)).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_flush_iterate_merges_by_id() {
        let store = SqliteBulkStore::in_memory();
        let mut dataset = store.create("test").await.unwrap();

        dataset
            .put(&Fragment::new("A").with_property("x", "1"), "0")
            .await
            .unwrap();
        dataset
            .put(&Fragment::new("B").with_property("x", "3"), "1")
            .await
            .unwrap();
        dataset
            .put(&Fragment::new("A").with_property("y", "2"), "2")
            .await
            .unwrap();
        dataset.flush().await.unwrap();

        let mut rx = dataset.iterate().await.unwrap();
        let mut entities = Vec::new();
        while let Some(entity) = rx.recv().await {
            entities.push(entity.unwrap());
        }

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, "A");
        assert_eq!(entities[0].properties.len(), 2);
        assert_eq!(entities[1].id, "B");
    }

    #[tokio::test]
    async fn test_flush_empty_buffer() {
        let store = SqliteBulkStore::in_memory();
        let mut dataset = store.create("test").await.unwrap();
        dataset.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_data_removes_table() {
        let store = SqliteBulkStore::in_memory();
        let mut dataset = store.create("test").await.unwrap();
        dataset
            .put(&Fragment::new("A").with_property("x", "1"), "0")
            .await
            .unwrap();
        dataset.flush().await.unwrap();
        dataset.drop_data().await.unwrap();

        let result = dataset.iterate().await.unwrap().recv().await;
        assert!(matches!(result, Some(Err(Error::BulkStore(_)))));
    }

    #[tokio::test]
    async fn test_file_backed_dataset_cleanup() {
        let root = std::env::temp_dir().join(format!("graphfold-bulk-{}", uuid::Uuid::new_v4().simple()));
        let store = SqliteBulkStore::new(&root);
        let mut dataset = store.create("pass1").await.unwrap();

        dataset
            .put(&Fragment::new("A").with_property("x", "1"), "0")
            .await
            .unwrap();
        dataset.flush().await.unwrap();
        assert!(root.join("pass1.sqlite").exists());

        dataset.drop_data().await.unwrap();
        assert!(!root.join("pass1.sqlite").exists());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
