//! Aggregation input resolution.
//!
//! The input key handed to an aggregation run may stand for a single
//! source location, or (when upstream stages registered shards during
//! the run) for a set of locations held in the ephemeral cache. Either
//! way the fragments of all resolved sources are chained into one
//! sequence.

use crate::model::Fragment;
use graphfold_core::{EphemeralCache, Error};

/// Resolve an input URI to its source locations.
///
/// A set-valued cache entry under the URI means the input was sharded;
/// its members are the shard locations. Otherwise the URI itself is the
/// single source. The entry is read without being consumed.
pub async fn resolve(cache: &EphemeralCache, uri: &str) -> Result<Vec<String>, Error> {
    let shards = cache.members(uri).await?;
    if shards.is_empty() {
        return Ok(vec![uri.to_string()]);
    }
    tracing::debug!("resolved {} to {} shards", uri, shards.len());
    Ok(shards.into_iter().collect())
}

/// Read fragments from JSON-lines sources, chained in order.
pub async fn read_fragments(paths: &[String]) -> Result<Vec<Fragment>, Error> {
    let mut fragments = Vec::new();
    for path in paths {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::CacheDecode(format!("read {path}: {e}")))?;
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            let fragment: Fragment =
                serde_json::from_str(line).map_err(|e| Error::CacheDecode(format!("parse {path}: {e}")))?;
            fragments.push(fragment);
        }
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphfold_core::CacheDb;

    async fn make_cache() -> EphemeralCache {
        let db = CacheDb::open_in_memory().await.unwrap();
        EphemeralCache::new(db, "test")
    }

    #[tokio::test]
    async fn test_resolve_unsharded() {
        let cache = make_cache().await;
        let sources = resolve(&cache, "/data/fragments.json").await.unwrap();
        assert_eq!(sources, vec!["/data/fragments.json".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_sharded() {
        let cache = make_cache().await;
        cache
            .add_members(
                "/data/fragments.json",
                &["/data/part-0.json".into(), "/data/part-1.json".into()],
            )
            .await
            .unwrap();

        let sources = resolve(&cache, "/data/fragments.json").await.unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[tokio::test]
    async fn test_read_fragments_chains_sources() {
        let dir = std::env::temp_dir().join(format!("graphfold-src-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let a = dir.join("a.json");
        let b = dir.join("b.json");
        tokio::fs::write(&a, "{\"id\":\"A\",\"properties\":{\"x\":[\"1\"]}}\n")
            .await
            .unwrap();
        tokio::fs::write(&b, "{\"id\":\"B\",\"properties\":{\"x\":[\"3\"]}}\n\n")
            .await
            .unwrap();

        let fragments = read_fragments(&[
            a.to_string_lossy().to_string(),
            b.to_string_lossy().to_string(),
        ])
        .await
        .unwrap();

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].id.as_deref(), Some("A"));
        assert_eq!(fragments[1].id.as_deref(), Some("B"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
