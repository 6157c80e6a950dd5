// Service-boundary response shape
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fusion::{Degradation, RankedResult};

/// Answer to one search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub request_id: Uuid,
    /// Normalized query text
    pub query: String,
    pub results: Vec<RankedResult>,
    /// Only one retrieval source contributed
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
    /// Served from an expired cache entry after both sources failed
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub cached: bool,
    pub elapsed_ms: u64,
    pub lexical_candidates: usize,
    pub vector_candidates: usize,
}

/// Outcome of one retrieval run; only complete (non-degraded) rankings are
/// kept in the results cache
#[derive(Debug, Clone)]
pub(crate) struct CachedRanking {
    pub results: Vec<RankedResult>,
    pub degraded: Option<Degradation>,
    pub lexical_candidates: usize,
    pub vector_candidates: usize,
}
