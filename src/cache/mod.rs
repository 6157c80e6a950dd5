//! Query cache
//!
//! Memoizes embedding computation and full result lists keyed by
//! (namespace, normalized query text). The namespace carries the model
//! version so vectors from a replaced model are never served.

pub mod query_cache;

pub use query_cache::{CacheKey, CacheStats, Lookup, QueryCache};
