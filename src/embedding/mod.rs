//! Embedding provider
//!
//! Components:
//! - Types: `EmbeddingVector` and the `EmbeddingProvider` trait
//! - Engine: local BERT sentence encoder (Candle)
//! - Cached: single-flight cache, inference deadline and retries in front of a provider

pub mod cached;
pub mod engine;
pub mod types;

pub use cached::CachedEmbedder;
pub use engine::{BertEmbeddingEngine, EngineOptions};
pub use types::{EmbeddingProvider, EmbeddingVector};
