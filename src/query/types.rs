// Query value types
use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, Result};
use crate::query::dates::PublishDateRange;

const FINGERPRINT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Optional restrictions applied to both retrieval paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<PublishDateRange>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.publish_date.is_none()
    }

    /// Stable textual form used in result-cache keys; bounds keep at least
    /// the precision sent to the index
    pub fn fingerprint(&self) -> String {
        match &self.publish_date {
            Some(range) => format!(
                "date={}..{}",
                range.start().format(FINGERPRINT_FORMAT),
                range.end().format(FINGERPRINT_FORMAT)
            ),
            None => String::new(),
        }
    }
}

/// One caller request at the service boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub text: String,
    /// Overrides the configured final result count
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filters: QueryFilters,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: None,
            filters: QueryFilters::default(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Validated, immutable query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    raw: String,
    normalized: String,
    filters: QueryFilters,
}

impl Query {
    /// Validate and normalize raw text; empty or whitespace-only text is rejected
    pub fn new(raw: impl Into<String>, filters: QueryFilters) -> Result<Self> {
        let raw = raw.into();
        let normalized = normalize_text(&raw);
        if normalized.is_empty() {
            return Err(QueryError::InputError(
                "query text must not be empty".to_string(),
            ));
        }

        Ok(Self {
            raw,
            normalized,
            filters,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased, trimmed, whitespace-collapsed text; the cache key
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn filters(&self) -> &QueryFilters {
        &self.filters
    }
}

/// Lowercase, trim and collapse runs of whitespace to one space
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let query = Query::new("  Climate   CHANGE\tpolicy \n", QueryFilters::default()).unwrap();
        assert_eq!(query.normalized(), "climate change policy");
        assert_eq!(query.raw(), "  Climate   CHANGE\tpolicy \n");
    }

    #[test]
    fn test_empty_query_rejected() {
        for text in ["", "   ", "\n\t "] {
            let err = Query::new(text, QueryFilters::default()).unwrap_err();
            assert!(matches!(err, QueryError::InputError(_)));
        }
    }

    #[test]
    fn test_equivalent_texts_share_normalized_form() {
        let a = Query::new("Rust Async", QueryFilters::default()).unwrap();
        let b = Query::new("  rust   async ", QueryFilters::default()).unwrap();
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_filter_fingerprint() {
        assert_eq!(QueryFilters::default().fingerprint(), "");

        let filters = QueryFilters {
            publish_date: Some(PublishDateRange::parse("2020-01-01", "2020-02-01").unwrap()),
        };
        assert_eq!(filters.fingerprint(), "date=2020-01-01T00:00:00..2020-02-01T00:00:00");
    }

    #[test]
    fn test_fingerprint_keeps_seconds() {
        let early = QueryFilters {
            publish_date: Some(
                PublishDateRange::parse("2024-01-01T00:00:00", "2024-01-01T00:00:10").unwrap(),
            ),
        };
        let late = QueryFilters {
            publish_date: Some(
                PublishDateRange::parse("2024-01-01T00:00:50", "2024-01-01T00:00:59").unwrap(),
            ),
        };
        assert_ne!(early.fingerprint(), late.fingerprint());
    }

    #[test]
    fn test_search_request_deserialize() {
        let request: SearchRequest = serde_json::from_str(r#"{"text": "elections"}"#).unwrap();
        assert_eq!(request.text, "elections");
        assert!(request.limit.is_none());
        assert!(request.filters.is_empty());

        let request: SearchRequest = serde_json::from_str(
            r#"{"text": "elections", "limit": 3, "filters": {"publish_date": {"start": "2020-01-01", "end": "2020-12-31"}}}"#,
        )
        .unwrap();
        assert_eq!(request.limit, Some(3));
        assert!(!request.filters.is_empty());
    }
}
