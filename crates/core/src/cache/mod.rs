//! SQLite-backed stores for stage handoff and fetched responses.
//!
//! This module provides two caches over one database layer, with async
//! access via tokio-rusqlite:
//!
//! - An ephemeral, namespaced key-value cache with claim-once read
//!   semantics, used to hand batches of work between pipeline stages
//! - A content-addressed store for fetched HTTP responses, keyed by
//!   SHA-256 checksums derived from resource validators
//!
//! Both run on WAL mode for concurrent access and use automatic schema
//! migrations.

pub mod connection;
pub mod ephemeral;
pub mod hash;
pub mod migrations;
pub mod responses;

pub use crate::Error;

pub use connection::CacheDb;
pub use ephemeral::EphemeralCache;
pub use responses::CachedResponse;
