//! Network-fetch and metadata-probe primitives.
//!
//! The [`Fetcher`] trait is the seam between the fetch cache and the
//! network: production code uses [`HttpFetcher`] (reqwest), tests use
//! counting mocks. Non-success status codes raise
//! [`Error::FetchFailed`](graphfold_core::Error::FetchFailed); there is no
//! retry at this layer, the caller or orchestrator owns retry policy.

pub mod agents;
pub mod probe;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use url::Url;

pub use probe::SourceHead;

use graphfold_core::Error;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "graphfold/0.1")
    pub user_agent: String,

    /// Request timeout (default: 30s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "graphfold/0.1".to_string(),
            timeout: Duration::from_millis(30_000),
            max_redirects: 5,
        }
    }
}

/// Per-call fetch options.
///
/// `headers` and `params` are part of the fetched content's identity.
/// `stream`, `stealthy`, `delay`, and `timeout` are transport-only and
/// must never contribute to cache identity.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Stream the response instead of buffering it. Streamed responses
    /// are not safely replayable and are never cached.
    pub stream: bool,

    /// Derive the cache key from the URL alone, skipping the metadata
    /// probe.
    pub url_key_only: bool,

    /// Substitute a randomized desktop User-Agent into request headers.
    pub stealthy: bool,

    /// Artificial delay before the request goes out.
    pub delay: Option<Duration>,

    /// Per-call timeout override.
    pub timeout: Option<Duration>,

    /// Extra request headers.
    pub headers: BTreeMap<String, String>,

    /// Query parameters.
    pub params: BTreeMap<String, String>,
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers, lowercased names
    pub headers: BTreeMap<String, String>,
    /// Response body bytes
    pub body: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// The network seam: a fetch primitive plus a lightweight metadata probe.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the real fetch.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, Error>;

    /// HEAD-equivalent probe for the resource's validators.
    async fn probe(&self, url: &str) -> Result<SourceHead, Error>;
}

/// HTTP fetch client backed by reqwest.
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn parse_url(url: &str, params: &BTreeMap<String, String>) -> Result<Url, Error> {
        let mut url = Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url_str: &str, options: &FetchOptions) -> Result<FetchResponse, Error> {
        if let Some(delay) = options.delay {
            tokio::time::sleep(delay).await;
        }

        let start = Instant::now();
        let url = Self::parse_url(url_str, &options.params)?;

        let mut request = self.http.get(url.clone());
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if options.stealthy {
            request = request.header(header::USER_AGENT, agents::random_agent());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        tracing::info!("GET {}", url);
        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchFailed { url: url_str.to_string(), status: status.as_u16() });
        }

        let headers = Self::collect_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("failed to read response: {}", e)))?;

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!("fetched {} in {}ms ({} bytes)", url, fetch_ms, body.len());

        Ok(FetchResponse { url: url_str.to_string(), status: status.as_u16(), headers, body, fetch_ms })
    }

    async fn probe(&self, url_str: &str) -> Result<SourceHead, Error> {
        let url = Url::parse(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let response = self
            .http
            .head(url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("network error: {}", e)))?;

        Ok(SourceHead::from_headers(url_str, Self::collect_headers(response.headers())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "graphfold/0.1");
        assert_eq!(config.timeout, Duration::from_millis(30_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_parse_url_with_params() {
        let mut params = BTreeMap::new();
        params.insert("page".to_string(), "2".to_string());
        let url = HttpFetcher::parse_url("https://example.com/data", &params).unwrap();
        assert_eq!(url.as_str(), "https://example.com/data?page=2");
    }

    #[test]
    fn test_parse_url_invalid() {
        let result = HttpFetcher::parse_url("not a url", &BTreeMap::new());
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let config = FetchConfig::default();
        let client = HttpFetcher::new(config);
        assert!(client.is_ok());
    }
}
