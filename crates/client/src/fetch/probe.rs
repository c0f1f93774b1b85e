//! Resource metadata from a HEAD-equivalent probe.
//!
//! The probe's headers carry the validators used for content-addressed
//! cache keys: an etag when the server provides one, else last-modified
//! and content-length.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata obtained from probing a remote resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHead {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

impl SourceHead {
    /// Build from lowercased response headers.
    pub fn from_headers(url: &str, headers: BTreeMap<String, String>) -> Self {
        Self {
            url: url.to_string(),
            etag: headers.get("etag").map(|v| v.trim_matches('"').to_string()),
            last_modified: headers.get("last-modified").cloned(),
            content_length: headers.get("content-length").and_then(|v| v.parse().ok()),
            content_type: headers.get("content-type").cloned(),
        }
    }

    /// The resource's change validator.
    ///
    /// Prefers the strong identifier (etag); falls back to last-modified
    /// plus length. None when the server exposes neither, which is still
    /// an acceptable key input.
    pub fn validator(&self) -> Option<String> {
        if let Some(etag) = &self.etag {
            return Some(etag.clone());
        }
        match (&self.last_modified, self.content_length) {
            (None, None) => None,
            (modified, length) => Some(format!(
                "{}:{}",
                modified.as_deref().unwrap_or(""),
                length.map(|l| l.to_string()).unwrap_or_default()
            )),
        }
    }

    /// Whether the resource is large enough to stream rather than buffer.
    ///
    /// An explicit numeric comparison against the configured threshold;
    /// unknown length means buffer.
    pub fn should_stream(&self, threshold_bytes: u64) -> bool {
        self.content_length.is_some_and(|len| len > threshold_bytes)
    }
}
