// In-memory embedder and retrievers for driving the pipeline without a cluster
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use newsquery::cache::QueryCache;
use newsquery::config::FusionConfig;
use newsquery::embedding::{CachedEmbedder, EmbeddingProvider, EmbeddingVector};
use newsquery::errors::{QueryError, Result};
use newsquery::fusion::ScoreFusion;
use newsquery::pipeline::{PipelineSettings, QueryPipeline};
use newsquery::query::QueryFilters;
use newsquery::retrieval::{
    check_dimension, Candidate, LexicalRetriever, RetrievalMethod, RetryManager, VectorRetriever,
};

pub const DIMS: usize = 4;

/// Deterministic embedder that counts calls and can be slowed down
pub struct MockEmbedder {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub dims: usize,
    pub version: String,
}

impl MockEmbedder {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            dims: DIMS,
            version: "mock-v1".to_string(),
        })
    }

    pub fn with_dims(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            dims,
            version: format!("mock-{}d", dims),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let seed = text.len() as f32;
        EmbeddingVector::new((0..self.dims).map(|i| seed + i as f32).collect())
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

/// How a mock retriever answers
#[derive(Clone)]
pub enum Behavior {
    Hits(Vec<(&'static str, f32)>),
    Fail(QueryError),
    Hang,
}

pub struct MockRetriever {
    method: RetrievalMethod,
    behavior: Behavior,
    failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockRetriever {
    pub fn new(method: RetrievalMethod, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            method,
            behavior,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    /// Force every later call to fail with `IndexUnavailable`
    pub fn break_index(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    async fn answer(&self, k: usize) -> Result<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueryError::IndexUnavailable("index went away".to_string()));
        }
        match &self.behavior {
            Behavior::Hits(hits) => Ok(hits
                .iter()
                .take(k)
                .map(|(id, score)| Candidate::new(*id, *score, self.method))
                .collect()),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl LexicalRetriever for MockRetriever {
    async fn search(&self, _text: &str, k: usize, _filters: &QueryFilters) -> Result<Vec<Candidate>> {
        self.answer(k).await
    }
}

#[async_trait]
impl VectorRetriever for MockRetriever {
    fn dimension(&self) -> usize {
        DIMS
    }

    async fn search(
        &self,
        vector: &EmbeddingVector,
        k: usize,
        _filters: &QueryFilters,
    ) -> Result<Vec<Candidate>> {
        check_dimension(DIMS, vector)?;
        self.answer(k).await
    }
}

pub fn lexical(behavior: Behavior) -> Arc<MockRetriever> {
    MockRetriever::new(RetrievalMethod::Lexical, behavior)
}

pub fn vector(behavior: Behavior) -> Arc<MockRetriever> {
    MockRetriever::new(RetrievalMethod::Vector, behavior)
}

/// Pipeline over mocks with default fusion weights (0.5 / 0.5)
pub fn pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: Arc<MockRetriever>,
    vector: Arc<MockRetriever>,
    settings: PipelineSettings,
) -> QueryPipeline {
    let embedder = Arc::new(CachedEmbedder::new(
        embedder,
        QueryCache::new(64, Duration::from_secs(300)),
        RetryManager::no_retry(),
        Duration::from_secs(1),
    ));

    QueryPipeline::new(
        embedder,
        lexical,
        vector,
        ScoreFusion::new(FusionConfig::default()),
        settings,
    )
    .with_results_cache(64, Duration::from_secs(300))
}

pub fn worked_example_lexical() -> Behavior {
    Behavior::Hits(vec![("A", 10.0), ("B", 5.0)])
}

pub fn worked_example_vector() -> Behavior {
    Behavior::Hits(vec![("B", 0.9), ("C", 0.4)])
}
