//! End-to-end query execution
//!
//! Flow per request:
//! 1. Validate and normalize the query
//! 2. Look up the results cache; identical concurrent misses share one
//!    retrieval computation
//! 3. Run the lexical path and the embed-then-vector path concurrently,
//!    both bounded by one query deadline
//! 4. Fuse; a single failed source degrades the response, two fail it
//! 5. Cache complete (non-degraded) rankings

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{CacheKey, CacheStats, Lookup, QueryCache};
use crate::config::QueryConf;
use crate::embedding::{CachedEmbedder, EmbeddingProvider};
use crate::errors::{ErrorClass, QueryError, Result};
use crate::fusion::{FusedResults, ScoreFusion};
use crate::pipeline::response::{CachedRanking, SearchResponse};
use crate::query::{Query, SearchRequest};
use crate::retrieval::{Candidate, LexicalRetriever, VectorRetriever};

/// Per-query limits taken from configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Candidates requested from each retriever
    pub k: usize,
    /// Default final result count
    pub limit: usize,
    /// Overall query deadline
    pub timeout: Duration,
    pub serve_stale_on_failure: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&QueryConf::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &QueryConf) -> Self {
        Self {
            k: config.retrieval.k,
            limit: config.query.limit,
            timeout: config.query_timeout(),
            serve_stale_on_failure: config.cache.serve_stale_on_failure,
        }
    }
}

/// Everything one retrieval run needs, owned so the run can be shared
/// between concurrent callers
#[derive(Clone)]
struct Retrieval {
    embedder: Arc<CachedEmbedder>,
    lexical: Arc<dyn LexicalRetriever>,
    vector: Arc<dyn VectorRetriever>,
    fusion: ScoreFusion,
    k: usize,
    timeout: Duration,
}

impl Retrieval {
    /// Both paths under one deadline, then fusion. Fatal and client errors
    /// and `NoRetrievalAvailable` are returned; a single failed path is
    /// recorded on the ranking.
    async fn run(self, query: Query, limit: usize, started: Instant) -> Result<Arc<CachedRanking>> {
        // an unrepresentable deadline means no deadline
        let deadline = started.checked_add(self.timeout);
        let (lexical, vector) = tokio::join!(
            self.lexical_path(&query, deadline),
            self.vector_path(&query, deadline)
        );

        for outcome in [&lexical, &vector] {
            if let Err(e) = outcome {
                if e.is_fatal() || e.class() == ErrorClass::Client {
                    return Err(e.clone());
                }
            }
        }

        let lexical_candidates = lexical.as_ref().map(Vec::len).unwrap_or(0);
        let vector_candidates = vector.as_ref().map(Vec::len).unwrap_or(0);

        let FusedResults { results, degraded } = self.fusion.fuse(lexical, vector, limit)?;
        Ok(Arc::new(CachedRanking {
            results,
            degraded,
            lexical_candidates,
            vector_candidates,
        }))
    }

    async fn lexical_path(&self, query: &Query, deadline: Option<Instant>) -> Result<Vec<Candidate>> {
        let search = self.lexical.search(query.normalized(), self.k, query.filters());
        self.within(deadline, search).await
    }

    async fn vector_path(&self, query: &Query, deadline: Option<Instant>) -> Result<Vec<Candidate>> {
        let search = async {
            let embedding = self.embedder.embed(query.normalized()).await?;
            self.vector.search(&embedding, self.k, query.filters()).await
        };
        self.within(deadline, search).await
    }

    async fn within<T>(
        &self,
        deadline: Option<Instant>,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match deadline {
            Some(deadline) => timeout_at(deadline, work).await.unwrap_or_else(|_| {
                Err(QueryError::Timeout {
                    duration_ms: self.timeout.as_millis() as u64,
                })
            }),
            None => work.await,
        }
    }
}

/// Hybrid query pipeline; shared across concurrent requests
pub struct QueryPipeline {
    retrieval: Retrieval,
    results: Option<QueryCache<Arc<CachedRanking>>>,
    settings: PipelineSettings,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<CachedEmbedder>,
        lexical: Arc<dyn LexicalRetriever>,
        vector: Arc<dyn VectorRetriever>,
        fusion: ScoreFusion,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retrieval: Retrieval {
                embedder,
                lexical,
                vector,
                fusion,
                k: settings.k,
                timeout: settings.timeout,
            },
            results: None,
            settings,
        }
    }

    /// Cache full rankings; with `serve_stale_on_failure` expired entries are
    /// retained for fallback
    pub fn with_results_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.results = Some(if self.settings.serve_stale_on_failure {
            QueryCache::with_stale_retention(capacity, ttl)
        } else {
            QueryCache::new(capacity, ttl)
        });
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn embedding_cache_stats(&self) -> CacheStats {
        self.retrieval.embedder.cache_stats()
    }

    pub fn results_cache_stats(&self) -> Option<CacheStats> {
        self.results.as_ref().map(|cache| cache.stats())
    }

    /// Swap the embedding model. The new model must match the index
    /// dimension; cached embeddings and rankings of the old version are dropped.
    pub fn reload_model(&self, provider: Arc<dyn EmbeddingProvider>) -> Result<()> {
        let expected = self.retrieval.vector.dimension();
        if provider.dimension() != expected {
            return Err(QueryError::DimensionMismatch {
                expected,
                actual: provider.dimension(),
            });
        }

        let embedder = &self.retrieval.embedder;
        let previous = embedder.model_version();
        embedder.reload(provider);
        if let Some(cache) = &self.results {
            if previous != embedder.model_version() {
                cache.invalidate_namespace(&previous);
            }
        }
        Ok(())
    }

    /// Execute one search request
    pub async fn execute(&self, request: SearchRequest) -> Result<SearchResponse> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("query", %request_id);
        self.execute_inner(request_id, request).instrument(span).await
    }

    async fn execute_inner(&self, request_id: Uuid, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();

        let limit = request.limit.unwrap_or(self.settings.limit);
        if limit == 0 {
            return Err(QueryError::InputError(
                "limit must be greater than 0".to_string(),
            ));
        }
        let query = Query::new(request.text, request.filters)?;
        let key = self.result_key(&query, limit);

        let run = self
            .retrieval
            .clone()
            .run(query.clone(), limit, started)
            .in_current_span();
        let outcome = match &self.results {
            Some(cache) => {
                cache
                    .get_or_compute_where(key.clone(), move || run, |ranking| {
                        ranking.degraded.is_none()
                    })
                    .await
            }
            None => run.await.map(|ranking| (ranking, Lookup::Computed)),
        };

        let (ranking, lookup) = match outcome {
            Ok(found) => found,
            Err(e @ QueryError::NoRetrievalAvailable(_)) => {
                return self.fallback(request_id, &query, &key, started, e);
            }
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                return Err(e);
            }
        };

        let cached = lookup == Lookup::Hit;
        let shared = lookup == Lookup::Coalesced;
        if cached {
            tracing::debug!(query = %query.normalized(), "result cache hit");
        }
        if let Some(degradation) = &ranking.degraded {
            tracing::warn!(
                missing = %degradation.missing,
                reason = %degradation.reason,
                "serving degraded results"
            );
        }

        let response = self.respond(request_id, &query, &ranking, started, cached, false);

        tracing::info!(
            query = %query.normalized(),
            k = self.settings.k,
            results = response.results.len(),
            lexical_candidates = response.lexical_candidates,
            vector_candidates = response.vector_candidates,
            degraded = response.degraded,
            shared,
            elapsed_ms = response.elapsed_ms,
            "query complete"
        );

        Ok(response)
    }

    /// Both sources failed: serve a retained stale ranking when allowed
    fn fallback(
        &self,
        request_id: Uuid,
        query: &Query,
        key: &CacheKey,
        started: Instant,
        error: QueryError,
    ) -> Result<SearchResponse> {
        if self.settings.serve_stale_on_failure {
            if let Some(stale) = self.results.as_ref().and_then(|cache| cache.peek_stale(key)) {
                tracing::warn!(error = %error, "all retrieval failed, serving stale results");
                return Ok(self.respond(request_id, query, &stale, started, true, true));
            }
        }

        tracing::error!(error = %error, "all retrieval failed");
        Err(error)
    }

    fn respond(
        &self,
        request_id: Uuid,
        query: &Query,
        ranking: &CachedRanking,
        started: Instant,
        cached: bool,
        stale: bool,
    ) -> SearchResponse {
        SearchResponse {
            request_id,
            query: query.normalized().to_string(),
            results: ranking.results.clone(),
            degraded: ranking.degraded.is_some(),
            degradation: ranking.degraded.clone(),
            stale,
            cached,
            elapsed_ms: started.elapsed().as_millis() as u64,
            lexical_candidates: ranking.lexical_candidates,
            vector_candidates: ranking.vector_candidates,
        }
    }

    /// Rankings are namespaced by model version; filters and limit are part
    /// of the key
    fn result_key(&self, query: &Query, limit: usize) -> CacheKey {
        CacheKey::new(
            self.retrieval.embedder.model_version(),
            format!(
                "{}\u{1f}{}\u{1f}{}",
                query.normalized(),
                query.filters().fingerprint(),
                limit
            ),
        )
    }
}
