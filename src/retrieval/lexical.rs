// Keyword (BM25) retrieval path
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ElasticConfig;
use crate::errors::Result;
use crate::index::{lexical_query, ElasticClient};
use crate::query::QueryFilters;
use crate::retrieval::retry::RetryManager;
use crate::retrieval::types::{rank_candidates, Candidate, RetrievalMethod};

/// Keyword search over the document corpus.
///
/// Returns at most `k` candidates ordered by descending score, ties by id.
#[async_trait]
pub trait LexicalRetriever: Send + Sync {
    async fn search(&self, text: &str, k: usize, filters: &QueryFilters) -> Result<Vec<Candidate>>;
}

/// BM25 `multi_match` against an Elasticsearch index
pub struct EsLexicalRetriever {
    client: Arc<ElasticClient>,
    config: ElasticConfig,
    retry: RetryManager,
}

impl EsLexicalRetriever {
    pub fn new(client: Arc<ElasticClient>, config: ElasticConfig, retry: RetryManager) -> Self {
        Self {
            client,
            config,
            retry,
        }
    }
}

#[async_trait]
impl LexicalRetriever for EsLexicalRetriever {
    async fn search(&self, text: &str, k: usize, filters: &QueryFilters) -> Result<Vec<Candidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let body = lexical_query(&self.config, text, k, filters);

        let response = self
            .retry
            .execute_with_retry(|| self.client.search(&self.config.index, &body))
            .await?;

        let candidates = rank_candidates(response.into_candidates(RetrievalMethod::Lexical), k);
        tracing::debug!(count = candidates.len(), "lexical candidates");
        Ok(candidates)
    }
}
