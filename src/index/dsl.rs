// Elasticsearch request bodies for the two retrieval paths
use serde_json::{json, Value};

use crate::config::ElasticConfig;
use crate::query::QueryFilters;

/// `_source` fields needed to build candidate metadata
pub const SOURCE_FIELDS: [&str; 5] = [
    "article.url",
    "article.title",
    "article.publish_date",
    "article.author",
    "topics.topic_names",
];

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Filter clauses shared by lexical and vector queries
pub fn filter_clauses(config: &ElasticConfig, filters: &QueryFilters) -> Vec<Value> {
    let mut clauses = Vec::new();

    if let Some(range) = &filters.publish_date {
        clauses.push(json!({
            "range": {
                config.date_field.as_str(): {
                    "gte": range.start().format(DATE_FORMAT).to_string(),
                    "lte": range.end().format(DATE_FORMAT).to_string(),
                }
            }
        }));
    }

    clauses
}

/// BM25 `multi_match` over the configured text fields
pub fn lexical_query(config: &ElasticConfig, text: &str, k: usize, filters: &QueryFilters) -> Value {
    json!({
        "size": k,
        "track_total_hits": false,
        "_source": SOURCE_FIELDS,
        "query": {
            "bool": {
                "must": {
                    "multi_match": {
                        "query": text,
                        "fields": config.text_fields,
                        "type": "best_fields",
                    }
                },
                "filter": filter_clauses(config, filters),
            }
        }
    })
}

/// Approximate kNN on the dense vector field
pub fn knn_query(config: &ElasticConfig, vector: &[f32], k: usize, filters: &QueryFilters) -> Value {
    let num_candidates = k.saturating_mul(config.num_candidates_factor.max(1)).max(k);

    let mut knn = json!({
        "field": config.vector_field,
        "query_vector": vector,
        "k": k,
        "num_candidates": num_candidates,
    });

    let clauses = filter_clauses(config, filters);
    if !clauses.is_empty() {
        knn["filter"] = Value::Array(clauses);
    }

    json!({
        "size": k,
        "track_total_hits": false,
        "_source": SOURCE_FIELDS,
        "knn": knn,
    })
}
