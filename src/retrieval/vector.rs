// Semantic (kNN) retrieval path
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ElasticConfig;
use crate::embedding::EmbeddingVector;
use crate::errors::{QueryError, Result};
use crate::index::{knn_query, ElasticClient};
use crate::query::QueryFilters;
use crate::retrieval::retry::RetryManager;
use crate::retrieval::types::{rank_candidates, Candidate, RetrievalMethod};

/// Nearest-neighbour search over document embeddings.
///
/// A query vector whose dimension differs from [`VectorRetriever::dimension`]
/// must fail with `DimensionMismatch` before any lookup.
#[async_trait]
pub trait VectorRetriever: Send + Sync {
    /// Dimension of the indexed vectors
    fn dimension(&self) -> usize;

    async fn search(
        &self,
        vector: &EmbeddingVector,
        k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<Candidate>>;
}

/// Check a query vector against an index dimension
pub fn check_dimension(expected: usize, vector: &EmbeddingVector) -> Result<()> {
    if vector.dimension() != expected {
        return Err(QueryError::DimensionMismatch {
            expected,
            actual: vector.dimension(),
        });
    }
    Ok(())
}

/// Approximate kNN against an Elasticsearch `dense_vector` field
pub struct EsVectorRetriever {
    client: Arc<ElasticClient>,
    config: ElasticConfig,
    retry: RetryManager,
}

impl EsVectorRetriever {
    pub fn new(client: Arc<ElasticClient>, config: ElasticConfig, retry: RetryManager) -> Self {
        Self {
            client,
            config,
            retry,
        }
    }
}

#[async_trait]
impl VectorRetriever for EsVectorRetriever {
    fn dimension(&self) -> usize {
        self.config.dims
    }

    async fn search(
        &self,
        vector: &EmbeddingVector,
        k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<Candidate>> {
        check_dimension(self.config.dims, vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let body = knn_query(&self.config, vector.as_slice(), k, filters);

        let response = self
            .retry
            .execute_with_retry(|| self.client.search(&self.config.index, &body))
            .await?;

        let candidates = rank_candidates(response.into_candidates(RetrievalMethod::Vector), k);
        tracing::debug!(count = candidates.len(), "vector candidates");
        Ok(candidates)
    }
}
