//! Query-time configuration (query_conf)
//!
//! Provides TOML/JSON/YAML configuration with defaults, environment overrides
//! and validation. Location: `--config`, then `QUERY_CONFIG`, then
//! `~/.newsquery/query_conf.toml`, then built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{QueryError, Result};
use crate::fusion::FusionStrategy;

/// Environment variable naming the configuration file
pub const QUERY_CONFIG_ENV: &str = "QUERY_CONFIG";

/// Upper bound for `query.timeout` and `query.inference_timeout` (one hour)
pub const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Complete configuration for the query service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConf {
    pub fusion: FusionConfig,
    pub retrieval: RetrievalConfig,
    pub query: QuerySettings,
    pub cache: CacheConfig,
    pub elastic: ElasticConfig,
    pub embeddings: EmbeddingsConfig,
}

/// Score fusion tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub lexical_weight: f32,
    pub vector_weight: f32,
    pub strategy: FusionStrategy,
    /// Rank offset for reciprocal-rank fusion
    pub rrf_k: f32,
}

/// Candidate fan-out and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates requested from each retriever
    pub k: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Per-query limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Overall query deadline in milliseconds
    pub timeout: u64,
    /// Final result count
    pub limit: usize,
    /// Embedding inference deadline in milliseconds
    pub inference_timeout: u64,
}

/// Cache sizing and policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds
    pub ttl: u64,
    pub capacity: usize,
    pub results_enabled: bool,
    pub serve_stale_on_failure: bool,
}

/// Elasticsearch connection and index layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub ca_path: Option<String>,
    pub tls_insecure: bool,
    pub index: String,
    pub vector_field: String,
    pub text_fields: Vec<String>,
    pub date_field: String,
    pub dims: usize,
    pub num_candidates_factor: usize,
}

/// Embedding model location and inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub model_path: Option<PathBuf>,
    pub model_version: Option<String>,
    pub max_sequence_len: usize,
    pub normalize: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.5,
            vector_weight: 0.5,
            strategy: FusionStrategy::WeightedSum,
            rrf_k: 60.0,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 50,
            max_retries: 3,
            retry_base_delay_ms: 100,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timeout: 2000,
            limit: 10,
            inference_timeout: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: 300,
            capacity: 1024,
            results_enabled: true,
            serve_stale_on_failure: false,
        }
    }
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            host: "https://localhost:9200".to_string(),
            user: "elastic".to_string(),
            password: None,
            ca_path: Some("certs/_data/ca/ca.crt".to_string()),
            tls_insecure: false,
            index: "articles".to_string(),
            vector_field: "analyzer.embeddings".to_string(),
            text_fields: vec![
                "article.title^2".to_string(),
                "article.paragraphs".to_string(),
            ],
            date_field: "article.publish_date".to_string(),
            dims: 384,
            num_candidates_factor: 10,
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_version: None,
            max_sequence_len: 256,
            normalize: true,
        }
    }
}

impl QueryConf {
    /// Load configuration from an explicit path, `QUERY_CONFIG`, the home
    /// directory or defaults, then apply environment overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| {
            std::env::var(QUERY_CONFIG_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        });

        let mut config = match path {
            Some(config_path) => Self::load_from_file(&config_path)?,
            None => Self::load_default()?,
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, format chosen by extension
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QueryError::ConfigError(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml")
            .to_ascii_lowercase();

        let config: QueryConf = match extension.as_str() {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| QueryError::ConfigError(format!("Failed to parse config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| QueryError::ConfigError(format!("Failed to parse config: {}", e)))?,
            _ => toml::from_str(&contents)
                .map_err(|e| QueryError::ConfigError(format!("Failed to parse config: {}", e)))?,
        };

        Ok(config)
    }

    /// Load from `~/.newsquery/query_conf.toml` or fall back to defaults
    pub fn load_default() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".newsquery").join("query_conf.toml");
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(QueryConf::default())
    }

    /// Apply deployment environment variables on top of file values
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ELASTIC_HOST") {
            self.elastic.host = host;
        }
        if let Some(user) = lookup("ELASTIC_USER") {
            self.elastic.user = user;
        }
        if let Some(password) = lookup("ELASTIC_PASSWORD") {
            self.elastic.password = Some(password);
        }
        if let Some(ca_path) = lookup("ELASTIC_CA_PATH") {
            self.elastic.ca_path = Some(ca_path).filter(|p| !p.is_empty());
        }
        if let Some(insecure) = lookup("ELASTIC_TLS_INSECURE") {
            self.elastic.tls_insecure = matches!(
                insecure.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(model_path) = lookup("EMBEDDINGS_MODEL_PATH") {
            self.embeddings.model_path = Some(PathBuf::from(model_path));
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let weights = [self.fusion.lexical_weight, self.fusion.vector_weight];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(QueryError::ConfigError(
                "fusion weights must be between 0.0 and 1.0".to_string(),
            ));
        }

        if (self.fusion.lexical_weight + self.fusion.vector_weight - 1.0).abs() > 1e-6 {
            return Err(QueryError::ConfigError(format!(
                "fusion weights must sum to 1.0, got {} + {}",
                self.fusion.lexical_weight, self.fusion.vector_weight
            )));
        }

        if self.fusion.rrf_k <= 0.0 {
            return Err(QueryError::ConfigError(
                "fusion.rrf_k must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.k == 0 {
            return Err(QueryError::ConfigError(
                "retrieval.k must be greater than 0".to_string(),
            ));
        }

        if self.query.limit == 0 {
            return Err(QueryError::ConfigError(
                "query.limit must be greater than 0".to_string(),
            ));
        }

        if self.query.timeout == 0 || self.query.inference_timeout == 0 {
            return Err(QueryError::ConfigError(
                "query timeouts must be greater than 0".to_string(),
            ));
        }

        if self.query.timeout > MAX_TIMEOUT_MS || self.query.inference_timeout > MAX_TIMEOUT_MS {
            return Err(QueryError::ConfigError(format!(
                "query timeouts must not exceed {} ms",
                MAX_TIMEOUT_MS
            )));
        }

        if self.cache.capacity == 0 {
            return Err(QueryError::ConfigError(
                "cache.capacity must be greater than 0".to_string(),
            ));
        }

        if self.elastic.dims == 0 {
            return Err(QueryError::ConfigError(
                "elastic.dims must be greater than 0".to_string(),
            ));
        }

        if self.elastic.text_fields.is_empty() {
            return Err(QueryError::ConfigError(
                "elastic.text_fields must name at least one field".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize for display with the password redacted
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.elastic.password.is_some() {
            shown.elastic.password = Some("********".to_string());
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| QueryError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query.timeout)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.query.inference_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl)
    }

    /// Model version used in cache keys; defaults to the model directory name
    pub fn model_version(&self) -> String {
        if let Some(version) = &self.embeddings.model_version {
            return version.clone();
        }
        self.embeddings
            .model_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unversioned".to_string())
    }
}
