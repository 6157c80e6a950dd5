//! newsquery - hybrid semantic/keyword query service
//!
//! Answers free-text queries over a news article index by combining a BM25
//! keyword search and a dense-vector nearest-neighbour search, fusing both
//! rankings into one list.
//!
//! # Architecture
//!
//! - **embedding**: local sentence encoder behind a single-flight cache
//! - **retrieval**: lexical and vector retrievers over Elasticsearch
//! - **fusion**: score normalization and weighted merge
//! - **pipeline**: concurrent retrieval, deadlines and degradation

pub mod errors;
pub use errors::{QueryError, Result};

pub mod cache;
pub mod config;
pub mod embedding;
pub mod fusion;
pub mod index;
pub mod pipeline;
pub mod query;
pub mod retrieval;

// Service surface
pub mod cli;
pub mod doctor;
pub mod telemetry;

pub use pipeline::{QueryPipeline, SearchResponse};
pub use query::SearchRequest;
