//! Content-addressed fetch cache.
//!
//! Wraps a [`Fetcher`] and serves prior responses without re-fetching.
//! Keys are derived from the resource's validators rather than its URL
//! alone, so an unchanged resource hits across repeated runs while a
//! changed validator forces a miss, the only invalidation path in this
//! layer. There is no TTL and no manual purge.

use crate::fetch::{FetchOptions, Fetcher};
use graphfold_core::cache::hash::content_checksum;
use graphfold_core::{CacheDb, CachedResponse, Error};

/// A fetcher that consults the response store before going to the network.
pub struct CachedFetcher<F: Fetcher> {
    fetcher: F,
    store: CacheDb,
}

impl<F: Fetcher> CachedFetcher<F> {
    pub fn new(fetcher: F, store: CacheDb) -> Self {
        Self { fetcher, store }
    }

    /// Fetch a URL through the cache.
    ///
    /// On a key hit the stored response is returned with zero network
    /// I/O. On a miss the real fetch runs and the response is stored
    /// under the derived key. Two concurrent callers missing on the same
    /// key race harmlessly: both fetch the same logical resource and the
    /// store overwrites idempotently.
    pub async fn get(&self, url: &str, options: &FetchOptions) -> Result<CachedResponse, Error> {
        let key = self.derive_key(url, options).await?;

        if let Some(key) = &key
            && let Some(cached) = self.store.get_response(key).await?
        {
            tracing::debug!("cache hit for {}", url);
            return Ok(cached);
        }

        let response = self.fetcher.fetch(url, options).await?;
        let cached = CachedResponse {
            key: key.clone().unwrap_or_default(),
            url: response.url,
            status: response.status,
            headers: response.headers,
            body: response.body.to_vec(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
        };

        if key.is_some() {
            self.store.put_response(&cached).await?;
        }

        Ok(cached)
    }

    /// Derive the content-addressed key for a call, or None when the
    /// call must not be cached.
    ///
    /// Streamed responses are not safely replayable and never get a key.
    /// Unless the caller asked to key by URL only, the resource is probed
    /// for a validator; a probe that yields none is acceptable, the key
    /// just loses that input. Transport-only options (stream, stealthy,
    /// delay, timeout) are excluded from the checksum.
    async fn derive_key(&self, url: &str, options: &FetchOptions) -> Result<Option<String>, Error> {
        if options.stream {
            return Ok(None);
        }

        let validator = if options.url_key_only {
            None
        } else {
            match self.fetcher.probe(url).await {
                Ok(head) => head.validator(),
                Err(e) => {
                    tracing::debug!("probe failed for {}: {}", url, e);
                    None
                }
            }
        };

        let key = content_checksum(&(url, validator, &options.params, &options.headers))?;
        Ok(Some(key))
    }
}
