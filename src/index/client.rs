//! Elasticsearch HTTP client
//!
//! Thin reqwest wrapper used by both retrievers and the doctor:
//! - Basic auth from `ELASTIC_USER` / `ELASTIC_PASSWORD`
//! - TLS trust from a CA PEM file, or disabled verification when insecure
//! - Status mapping: 5xx and transport failures are `IndexUnavailable`,
//!   4xx is `IndexRejected`

use reqwest::{Certificate, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::config::ElasticConfig;
use crate::errors::{QueryError, Result};
use crate::index::response::{parse_field_dims, ClusterHealth, EsSearchResponse};

/// Response bodies longer than this are cut in error messages
const MAX_ERROR_BODY: usize = 512;

/// Elasticsearch client
#[derive(Debug, Clone)]
pub struct ElasticClient {
    client: Client,
    base_url: String,
    user: String,
    password: Option<String>,
}

impl ElasticClient {
    /// Build a client from connection settings; `request_timeout` bounds each call
    pub fn from_config(config: &ElasticConfig, request_timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder().timeout(request_timeout);

        if config.tls_insecure {
            tracing::warn!(host = %config.host, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ca_path) = &config.ca_path {
            match std::fs::read(ca_path) {
                Ok(pem) => {
                    let cert = Certificate::from_pem(&pem).map_err(|e| {
                        QueryError::ConfigError(format!("Invalid CA certificate {}: {}", ca_path, e))
                    })?;
                    builder = builder.add_root_certificate(cert);
                }
                Err(e) => {
                    tracing::warn!(
                        ca_path = %ca_path,
                        error = %e,
                        "CA certificate not readable, using system roots"
                    );
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| QueryError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.host.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.password {
            Some(password) => request.basic_auth(&self.user, Some(password)),
            None => request,
        }
    }

    /// Run a search body against `index`
    pub async fn search(&self, index: &str, body: &Value) -> Result<EsSearchResponse> {
        let url = format!("{}/{}/_search", self.base_url, index);

        let response = self
            .authorized(self.client.post(&url).json(body))
            .send()
            .await
            .map_err(|e| QueryError::IndexUnavailable(format!("Search request failed: {}", e)))?;

        let response = check_status(response).await?;

        let parsed: EsSearchResponse = response.json().await.map_err(|e| {
            QueryError::IndexUnavailable(format!("Failed to parse search response: {}", e))
        })?;

        if parsed.timed_out {
            tracing::warn!(index, took_ms = parsed.took, "search timed out server-side, partial hits");
        }

        Ok(parsed)
    }

    /// `GET _cluster/health`
    pub async fn cluster_health(&self) -> Result<ClusterHealth> {
        let url = format!("{}/_cluster/health", self.base_url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| QueryError::IndexUnavailable(format!("Health request failed: {}", e)))?;

        let response = check_status(response).await?;

        response.json().await.map_err(|e| {
            QueryError::IndexUnavailable(format!("Failed to parse cluster health: {}", e))
        })
    }

    /// Dimension of the dense vector `field` in `index`, if it is mapped
    pub async fn vector_dims(&self, index: &str, field: &str) -> Result<Option<usize>> {
        let url = format!("{}/{}/_mapping", self.base_url, index);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| QueryError::IndexUnavailable(format!("Mapping request failed: {}", e)))?;

        let response = check_status(response).await?;

        let mapping: Value = response.json().await.map_err(|e| {
            QueryError::IndexUnavailable(format!("Failed to parse index mapping: {}", e))
        })?;

        Ok(parse_field_dims(&mapping, field))
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(status_error(status, body))
}

/// Map a non-success status to the error taxonomy
pub fn status_error(status: StatusCode, mut body: String) -> QueryError {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    if status.is_client_error() {
        QueryError::IndexRejected {
            status: status.as_u16(),
            body,
        }
    } else {
        QueryError::IndexUnavailable(format!("HTTP {}: {}", status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let rejected = status_error(StatusCode::BAD_REQUEST, "parse_exception".to_string());
        assert_eq!(
            rejected,
            QueryError::IndexRejected {
                status: 400,
                body: "parse_exception".to_string()
            }
        );
        assert!(!rejected.is_retryable());

        let unavailable = status_error(StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(matches!(unavailable, QueryError::IndexUnavailable(_)));
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_long_error_body_is_cut() {
        let err = status_error(StatusCode::NOT_FOUND, "é".repeat(600));
        match err {
            QueryError::IndexRejected { body, .. } => assert!(body.len() <= MAX_ERROR_BODY),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_ca_falls_back() {
        let config = ElasticConfig {
            ca_path: Some("/nonexistent/ca.crt".to_string()),
            host: "https://localhost:9200/".to_string(),
            ..ElasticConfig::default()
        };
        let client = ElasticClient::from_config(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "https://localhost:9200");
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_index_unavailable() {
        let config = ElasticConfig {
            host: "http://127.0.0.1:1".to_string(),
            ca_path: None,
            ..ElasticConfig::default()
        };
        let client = ElasticClient::from_config(&config, Duration::from_millis(500)).unwrap();
        let err = client.cluster_health().await.unwrap_err();
        assert!(matches!(err, QueryError::IndexUnavailable(_)));
    }

    #[tokio::test]
    #[ignore] // Integration test - requires a running cluster at ELASTIC_HOST
    async fn test_cluster_health_live() {
        let mut config = ElasticConfig::default();
        config.host = std::env::var("ELASTIC_HOST").expect("ELASTIC_HOST not set");
        config.password = std::env::var("ELASTIC_PASSWORD").ok();
        let client = ElasticClient::from_config(&config, Duration::from_secs(5)).unwrap();
        let health = client.cluster_health().await.expect("health failed");
        assert!(!health.status.is_empty());
    }
}
