//! Core types and shared functionality for graphfold.
//!
//! This crate provides:
//! - SQLite-backed stores: the ephemeral stage-handoff cache and the
//!   fetch-response cache
//! - Content-addressed cache key hashing
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CachedResponse, EphemeralCache};
pub use config::AppConfig;
pub use error::Error;
