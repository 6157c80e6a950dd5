// Search response DTOs and conversion into retrieval candidates
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::retrieval::{Candidate, RetrievalMethod};

#[derive(Debug, Clone, Deserialize)]
pub struct EsSearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    pub hits: EsHits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsHits {
    #[serde(default)]
    pub hits: Vec<EsHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsHit {
    #[serde(rename = "_id")]
    pub id: String,
    /// Absent when the query sorts on something other than relevance
    #[serde(rename = "_score")]
    pub score: Option<f32>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// Cluster health summary from `_cluster/health`
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterHealth {
    pub cluster_name: String,
    /// green, yellow or red
    pub status: String,
    #[serde(default)]
    pub number_of_nodes: u64,
}

impl EsSearchResponse {
    /// Convert every scored hit into a candidate for `method`
    pub fn into_candidates(self, method: RetrievalMethod) -> Vec<Candidate> {
        self.hits
            .hits
            .into_iter()
            .filter_map(|hit| hit_to_candidate(hit, method))
            .collect()
    }
}

/// Unscored hits are skipped
pub fn hit_to_candidate(hit: EsHit, method: RetrievalMethod) -> Option<Candidate> {
    let score = hit.score?;
    let article = hit.source.get("article");

    let mut metadata = Map::new();
    if let Some(article) = article {
        for (key, field) in [
            ("url", "url"),
            ("publish_date", "publish_date"),
            ("authors", "author"),
            ("title", "title"),
        ] {
            if let Some(value) = article.get(field).filter(|v| !v.is_null()) {
                metadata.insert(key.to_string(), value.clone());
            }
        }
    }
    if let Some(topics) = hit
        .source
        .get("topics")
        .and_then(|t| t.get("topic_names"))
        .filter(|v| !v.is_null())
    {
        metadata.insert("topics".to_string(), topics.clone());
    }

    let snippet = article.and_then(|a| a.get("title")).and_then(first_text);

    let mut candidate = Candidate::new(hit.id, score, method);
    candidate.metadata = metadata;
    candidate.snippet = snippet;
    Some(candidate)
}

/// Titles are stored as a list of lines; older documents use a plain string
fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}

/// Read `dims` of a dense vector field out of a `_mapping` response.
///
/// `field` is a dotted path such as `analyzer.embeddings`.
pub fn parse_field_dims(mapping: &Value, field: &str) -> Option<usize> {
    let index_mapping = mapping.as_object()?.values().next()?;
    let mut node = index_mapping.get("mappings")?;

    for part in field.split('.') {
        node = node.get("properties")?.get(part)?;
    }

    node.get("dims")?.as_u64().map(|d| d as usize)
}
