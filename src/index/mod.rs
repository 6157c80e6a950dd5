//! Elasticsearch access
//!
//! Components:
//! - Client: authenticated HTTP transport and status mapping
//! - DSL: lexical and kNN request bodies
//! - Response: hit parsing and mapping inspection

pub mod client;
pub mod dsl;
pub mod response;

pub use client::ElasticClient;
pub use dsl::{knn_query, lexical_query};
pub use response::{ClusterHealth, EsHit, EsSearchResponse};
