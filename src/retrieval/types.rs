// Candidate documents produced by the retrievers
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Retrieval signal a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    Lexical,
    Vector,
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMethod::Lexical => write!(f, "lexical"),
            RetrievalMethod::Vector => write!(f, "vector"),
        }
    }
}

/// One scored document from a single retriever
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// Raw backend score (BM25 or similarity); scales differ per method
    pub score: f32,
    pub method: RetrievalMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, score: f32, method: RetrievalMethod) -> Self {
        Self {
            id: id.into(),
            score,
            method,
            snippet: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Descending score, then ascending document id
pub fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

/// Put a raw candidate list into retriever output form: non-finite scores
/// dropped, one candidate per id (best score kept), ordered by
/// [`candidate_order`], at most `k` long.
pub fn rank_candidates(candidates: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    let mut best: HashMap<String, Candidate> = HashMap::with_capacity(candidates.len());

    for candidate in candidates {
        if !candidate.score.is_finite() {
            tracing::debug!(id = %candidate.id, "dropping candidate with non-finite score");
            continue;
        }
        match best.get(&candidate.id) {
            Some(existing) if existing.score >= candidate.score => {}
            _ => {
                best.insert(candidate.id.clone(), candidate);
            }
        }
    }

    let mut ranked: Vec<Candidate> = best.into_values().collect();
    ranked.sort_by(candidate_order);
    ranked.truncate(k);
    ranked
}
