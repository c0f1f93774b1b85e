//! Content-addressed cache key generation.

use crate::Error;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a stable content checksum over an ordered tuple of key parts.
///
/// The parts are serialized to JSON and hashed with SHA-256, so any change
/// to a resource's URL, validator, or identity-relevant options yields a
/// different key.
pub fn content_checksum<T: Serialize>(parts: &T) -> Result<String, Error> {
    let encoded = serde_json::to_vec(parts).map_err(|e| Error::CacheDecode(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Ok(hex::encode(hasher.finalize()))
}
