//! Fetch-response store operations.
//!
//! Persists full fetch results keyed by the content checksum derived from
//! a resource's URL and validators, so repeated runs can serve a prior
//! response without any network I/O.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored fetch result.
///
/// Carries everything a later call with the same key needs to behave as
/// if it had performed the fetch itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub fetched_at: String,
}

impl CacheDb {
    /// Insert or overwrite a cached response.
    ///
    /// Uses UPSERT semantics. Concurrent callers racing on the same key
    /// both fetched the same logical resource, so last write wins without
    /// corruption; the only cost is duplicated network work.
    pub async fn put_response(&self, response: &CachedResponse) -> Result<(), Error> {
        let response = response.clone();
        let headers_json = serde_json::to_string(&response.headers).map_err(|e| Error::CacheDecode(e.to_string()))?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO responses (key, url, status, headers_json, body, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(key) DO UPDATE SET
                         url = excluded.url,
                         status = excluded.status,
                         headers_json = excluded.headers_json,
                         body = excluded.body,
                         fetched_at = excluded.fetched_at",
                    params![
                        &response.key,
                        &response.url,
                        response.status as i64,
                        headers_json,
                        &response.body,
                        &response.fetched_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a cached response by key.
    ///
    /// Returns None on miss. There is no TTL and no purge here; a changed
    /// validator yields a different key, which is this layer's only
    /// invalidation path.
    pub async fn get_response(&self, key: &str) -> Result<Option<CachedResponse>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let result = conn.query_row(
                    "SELECT key, url, status, headers_json, body, fetched_at
                     FROM responses WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Vec<u8>>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                );

                match result {
                    Ok((key, url, status, headers_json, body, fetched_at)) => {
                        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)
                            .map_err(|e| Error::CacheDecode(e.to_string()))?;
                        Ok(Some(CachedResponse {
                            key,
                            url,
                            status: status as u16,
                            headers,
                            body,
                            fetched_at,
                        }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}
