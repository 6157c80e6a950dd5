//! Doctor command for deployment diagnostics
//!
//! Checks that configuration, the embedding model and the Elasticsearch index
//! agree with each other before serving queries.

use colored::Colorize;
use std::path::Path;

use crate::config::QueryConf;
use crate::embedding::engine::model_files;
use crate::index::ElasticClient;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    config: QueryConf,
}

impl Doctor {
    pub fn new(config: QueryConf) -> Self {
        Self { config }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        let mut checks = vec![
            self.check_config(),
            self.check_tls(),
            self.check_model_files(),
            self.check_model_dims(),
        ];

        match ElasticClient::from_config(&self.config.elastic, self.config.query_timeout()) {
            Ok(client) => {
                checks.push(self.check_cluster(&client).await);
                checks.push(self.check_index_dims(&client).await);
            }
            Err(e) => checks.push(HealthCheck::new(
                "Elasticsearch",
                HealthStatus::Fail(e.to_string()),
            )),
        }

        checks
    }

    /// Check 1: configuration values
    fn check_config(&self) -> HealthCheck {
        let status = match self.config.validate() {
            Ok(()) => HealthStatus::Pass,
            Err(e) => HealthStatus::Fail(e.to_string()),
        };
        HealthCheck::new("Configuration", status)
    }

    /// Check 2: TLS trust setup
    fn check_tls(&self) -> HealthCheck {
        let elastic = &self.config.elastic;
        let status = if elastic.tls_insecure {
            HealthStatus::Warn("certificate verification disabled".to_string())
        } else {
            match &elastic.ca_path {
                Some(path) if !Path::new(path).is_file() => {
                    HealthStatus::Warn(format!("CA file {} not found, using system roots", path))
                }
                _ => HealthStatus::Pass,
            }
        };
        HealthCheck::new("TLS", status)
    }

    /// Check 3: model artifacts present
    fn check_model_files(&self) -> HealthCheck {
        let Some(model_dir) = &self.config.embeddings.model_path else {
            return HealthCheck::new(
                "Model Files",
                HealthStatus::Fail("EMBEDDINGS_MODEL_PATH is not set".to_string()),
            );
        };

        let missing: Vec<String> = model_files(model_dir)
            .iter()
            .filter(|path| !path.is_file())
            .map(|path| path.display().to_string())
            .collect();

        let status = if missing.is_empty() {
            HealthStatus::Pass
        } else {
            HealthStatus::Fail(format!("missing {}", missing.join(", ")))
        };
        HealthCheck::new("Model Files", status)
    }

    /// Check 4: model hidden size equals configured index dimension
    fn check_model_dims(&self) -> HealthCheck {
        let Some(model_dir) = &self.config.embeddings.model_path else {
            return HealthCheck::new(
                "Model Dimension",
                HealthStatus::Warn("no model configured".to_string()),
            );
        };

        let status = match read_hidden_size(model_dir) {
            Some(dims) if dims == self.config.elastic.dims => HealthStatus::Pass,
            Some(dims) => HealthStatus::Fail(format!(
                "model produces {} dimensions, index expects {}",
                dims, self.config.elastic.dims
            )),
            None => HealthStatus::Warn("cannot read hidden_size from model config".to_string()),
        };
        HealthCheck::new("Model Dimension", status)
    }

    /// Check 5: cluster reachable and healthy
    async fn check_cluster(&self, client: &ElasticClient) -> HealthCheck {
        let status = match client.cluster_health().await {
            Ok(health) => match health.status.as_str() {
                "green" => HealthStatus::Pass,
                "yellow" => HealthStatus::Warn(format!(
                    "cluster {} is yellow ({} nodes)",
                    health.cluster_name, health.number_of_nodes
                )),
                other => HealthStatus::Fail(format!(
                    "cluster {} is {}",
                    health.cluster_name, other
                )),
            },
            Err(e) => HealthStatus::Fail(e.to_string()),
        };
        HealthCheck::new("Cluster Health", status)
    }

    /// Check 6: index vector field mapped with the configured dimension
    async fn check_index_dims(&self, client: &ElasticClient) -> HealthCheck {
        let elastic = &self.config.elastic;
        let status = match client.vector_dims(&elastic.index, &elastic.vector_field).await {
            Ok(Some(dims)) if dims == elastic.dims => HealthStatus::Pass,
            Ok(Some(dims)) => HealthStatus::Fail(format!(
                "{} is mapped with {} dimensions, configured {}",
                elastic.vector_field, dims, elastic.dims
            )),
            Ok(None) => HealthStatus::Fail(format!(
                "{} has no dense_vector mapping in {}",
                elastic.vector_field, elastic.index
            )),
            Err(e) => HealthStatus::Fail(e.to_string()),
        };
        HealthCheck::new("Index Mapping", status)
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "newsquery diagnostics".bold());
        println!("{:<20} Status", "Check");
        println!("{}", "=".repeat(50));

        for check in checks {
            let message = match &check.status {
                HealthStatus::Pass => "PASS".green().to_string(),
                HealthStatus::Warn(msg) => format!("WARN: {}", msg).yellow().to_string(),
                HealthStatus::Fail(msg) => format!("FAIL: {}", msg).red().to_string(),
            };
            println!("{:<20} {}", check.name, message);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}

fn read_hidden_size(model_dir: &Path) -> Option<usize> {
    let contents = std::fs::read_to_string(model_dir.join("config.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
    value.get("hidden_size")?.as_u64().map(|d| d as usize)
}
