//! Query pipeline
//!
//! Components:
//! - QueryPipeline: cache check, concurrent retrieval, fusion, degradation
//! - Builder: startup wiring from configuration
//! - Response: the service-boundary answer

pub mod builder;
pub mod query_pipeline;
pub mod response;

pub use builder::{build_pipeline, build_with_provider, load_embedding_model};
pub use query_pipeline::{PipelineSettings, QueryPipeline};
pub use response::SearchResponse;
