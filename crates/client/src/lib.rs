//! Client code for graphfold.
//!
//! This crate provides the network-fetch and metadata-probe primitives and
//! the content-addressed fetch cache layered over them.

pub mod cached;
pub mod fetch;

pub use cached::CachedFetcher;
pub use fetch::{FetchConfig, FetchOptions, FetchResponse, Fetcher, HttpFetcher, SourceHead};
