//! Unified error types for graphfold.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by all graphfold crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backing store unreachable at construction. Fatal: there is no
    /// lazy-reconnect path.
    #[error("CACHE_UNAVAILABLE: {0}")]
    CacheUnavailable(String),

    /// Payload could not be encoded on set, or decoded on get.
    #[error("CACHE_DECODE: {0}")]
    CacheDecode(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Non-success HTTP status. No retry at this layer; the caller owns
    /// retry policy.
    #[error("FETCH_FAILED: {url} returned status {status}")]
    FetchFailed { url: String, status: u16 },

    /// Transport-level HTTP failure (network error, timeout, body read).
    #[error("HTTP_ERROR: {0}")]
    Http(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// A fragment without an identifier. Reported per item and skipped;
    /// never aborts the surrounding aggregation run.
    #[error("INVALID_FRAGMENT: {0}")]
    InvalidFragment(String),

    /// Write, flush, or iteration failure in the external-store
    /// aggregation strategy. Fatal to that run.
    #[error("BULK_STORE: {0}")]
    BulkStore(String),

    /// A pipeline stage task failed or was cancelled.
    #[error("STAGE_FAILED: {0}")]
    Stage(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CacheDecode(err.to_string())
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
