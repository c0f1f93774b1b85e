//! Ephemeral stage-handoff cache with claim-once reads.
//!
//! Pipeline stages hand batches of work to each other through this cache
//! instead of re-transmitting payloads: a producer stores a batch, passes
//! the returned key downstream, and the consumer claims the batch by
//! reading it. The default read deletes the entry in the same database
//! call, so at most one consumer ever observes a given value. Safety
//! between concurrent stages relies entirely on key uniqueness plus that
//! claim-once read; no locking is provided or required.

use super::connection::CacheDb;
use crate::Error;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Namespaced key-value cache over the shared backing store.
///
/// Payloads are opaque to the cache: anything serde can round-trip
/// through JSON (nested mappings, sequences, scalars) is accepted.
#[derive(Clone, Debug)]
pub struct EphemeralCache {
    db: CacheDb,
    namespace: String,
}

impl EphemeralCache {
    /// Create a cache handle over an already-probed backing store.
    ///
    /// The namespace is process-wide configuration, not per-call; every
    /// physical key is `"{namespace}:{logical}"`.
    pub fn new(db: CacheDb, namespace: impl Into<String>) -> Self {
        Self { db, namespace: namespace.into() }
    }

    /// Store a payload and return its key.
    ///
    /// When no key is given, a fresh collision-resistant random token is
    /// generated, so concurrent producers never need to coordinate.
    pub async fn set<T: Serialize>(&self, payload: &T, key: Option<&str>) -> Result<String, Error> {
        let data = serde_json::to_vec(payload).map_err(|e| Error::CacheDecode(e.to_string()))?;
        let len = data.len();
        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let physical = self.physical_key(&key);
        let created_at = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key, payload, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                         payload = excluded.payload,
                         created_at = excluded.created_at",
                    params![physical, data, created_at],
                )?;
                Ok(())
            })
            .await?;
        tracing::debug!("cached {} bytes under {}", len, self.physical_key(&key));
        Ok(key)
    }

    /// Read a payload; with `delete` (the default consumer behavior) the
    /// entry is removed in the same database call, so a second read
    /// returns `None`.
    ///
    /// A corrupt payload surfaces as [`Error::CacheDecode`]; with `delete`
    /// the entry is still consumed.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, delete: bool) -> Result<Option<T>, Error> {
        let physical = self.physical_key(key);
        let raw = self
            .db
            .conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let found = conn.query_row(
                    "SELECT payload FROM entries WHERE key = ?1",
                    params![physical],
                    |row| row.get::<_, Vec<u8>>(0),
                );
                let found = match found {
                    Ok(payload) => Some(payload),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                };
                if delete && found.is_some() {
                    conn.execute("DELETE FROM entries WHERE key = ?1", params![physical])?;
                }
                Ok(found)
            })
            .await?;

        match raw {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| Error::CacheDecode(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Add values to a set-valued entry, deduplicating.
    ///
    /// Used to register sharded source locations under one input key; the
    /// aggregator resolves them with [`members`](Self::members). The
    /// read-union-write happens in a single serialized database call, so
    /// concurrent registrations against the same key never lose members.
    pub async fn add_members(&self, key: &str, values: &[String]) -> Result<(), Error> {
        let physical = self.physical_key(key);
        let values = values.to_vec();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let found = conn.query_row(
                    "SELECT payload FROM entries WHERE key = ?1",
                    params![physical],
                    |row| row.get::<_, Vec<u8>>(0),
                );
                let mut set: BTreeSet<String> = match found {
                    Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::CacheDecode(e.to_string()))?,
                    Err(rusqlite::Error::QueryReturnedNoRows) => BTreeSet::new(),
                    Err(e) => return Err(e.into()),
                };
                set.extend(values);
                let data = serde_json::to_vec(&set).map_err(|e| Error::CacheDecode(e.to_string()))?;
                conn.execute(
                    "INSERT INTO entries (key, payload, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                         payload = excluded.payload,
                         created_at = excluded.created_at",
                    params![physical, data, created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Read a set-valued entry without consuming it.
    pub async fn members(&self, key: &str) -> Result<BTreeSet<String>, Error> {
        Ok(self.get(key, false).await?.unwrap_or_default())
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn make_cache() -> EphemeralCache {
        let db = CacheDb::open_in_memory().await.unwrap();
        EphemeralCache::new(db, "test")
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = make_cache().await;
        let payload = json!({"records": [{"name": "acme", "country": "de"}], "count": 1});
        let key = cache.set(&payload, None).await.unwrap();

        let got: Option<serde_json::Value> = cache.get(&key, true).await.unwrap();
        assert_eq!(got, Some(payload));
    }

    #[tokio::test]
    async fn test_claim_once() {
        let cache = make_cache().await;
        let key = cache.set(&json!([1, 2, 3]), None).await.unwrap();

        let first: Option<serde_json::Value> = cache.get(&key, true).await.unwrap();
        assert!(first.is_some());

        let second: Option<serde_json::Value> = cache.get(&key, true).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_get_without_delete() {
        let cache = make_cache().await;
        let key = cache.set(&json!("payload"), None).await.unwrap();

        let first: Option<serde_json::Value> = cache.get(&key, false).await.unwrap();
        let second: Option<serde_json::Value> = cache.get(&key, false).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[tokio::test]
    async fn test_generated_keys_distinct() {
        let cache = make_cache().await;
        let mut keys = std::collections::HashSet::new();
        for _ in 0..50 {
            keys.insert(cache.set(&json!(0), None).await.unwrap());
        }
        assert_eq!(keys.len(), 50);
    }

    #[tokio::test]
    async fn test_explicit_key() {
        let cache = make_cache().await;
        let key = cache.set(&json!("v"), Some("batch-1")).await.unwrap();
        assert_eq!(key, "batch-1");

        let got: Option<String> = cache.get("batch-1", true).await.unwrap();
        assert_eq!(got.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let cache = make_cache().await;
        let got: Option<serde_json::Value> = cache.get("never-set", true).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_members() {
        let cache = make_cache().await;
        cache
            .add_members("shards", &["s3://a.json".into(), "s3://b.json".into()])
            .await
            .unwrap();
        cache
            .add_members("shards", &["s3://b.json".into(), "s3://c.json".into()])
            .await
            .unwrap();

        let members = cache.members("shards").await.unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.contains("s3://b.json"));
    }

    #[tokio::test]
    async fn test_concurrent_member_registration_loses_nothing() {
        let cache = make_cache().await;
        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.add_members("shards", &[format!("s3://part-{i}.json")]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let members = cache.members("shards").await.unwrap();
        assert_eq!(members.len(), 32);
    }

    #[tokio::test]
    async fn test_corrupt_payload_surfaces_and_is_consumed() {
        let cache = make_cache().await;
        cache
            .db
            .conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO entries (key, payload, created_at) VALUES (?1, ?2, ?3)",
                    params!["test:corrupt", vec![0xc0u8, 0xff, 0xee], "2026-01-01T00:00:00Z"],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();

        let result = cache.get::<serde_json::Value>("corrupt", true).await;
        assert!(matches!(result, Err(Error::CacheDecode(_))));

        let second: Option<serde_json::Value> = cache.get("corrupt", true).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_namespaces_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let a = EphemeralCache::new(db.clone(), "run-a");
        let b = EphemeralCache::new(db, "run-b");

        a.set(&json!("only-a"), Some("k")).await.unwrap();
        let from_b: Option<serde_json::Value> = b.get("k", true).await.unwrap();
        assert!(from_b.is_none());
    }
}
