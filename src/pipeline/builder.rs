// Process startup: load the model once and wire every component from config
use std::sync::Arc;

use crate::cache::QueryCache;
use crate::config::QueryConf;
use crate::embedding::{BertEmbeddingEngine, CachedEmbedder, EmbeddingProvider, EngineOptions};
use crate::errors::{QueryError, Result};
use crate::fusion::ScoreFusion;
use crate::index::ElasticClient;
use crate::pipeline::query_pipeline::{PipelineSettings, QueryPipeline};
use crate::retrieval::{EsLexicalRetriever, EsVectorRetriever, RetryManager};

/// Load the embedding model named by configuration.
///
/// Missing path or artifacts are `ModelUnavailable`; this is fatal at startup.
pub fn load_embedding_model(config: &QueryConf) -> Result<BertEmbeddingEngine> {
    let model_path = config.embeddings.model_path.as_ref().ok_or_else(|| {
        QueryError::ModelUnavailable("EMBEDDINGS_MODEL_PATH is not set".to_string())
    })?;

    BertEmbeddingEngine::load(
        model_path,
        EngineOptions {
            model_version: config.model_version(),
            max_sequence_len: config.embeddings.max_sequence_len,
            normalize: config.embeddings.normalize,
        },
    )
}

/// Build a pipeline against Elasticsearch around an already loaded provider
pub fn build_with_provider(
    config: &QueryConf,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<QueryPipeline> {
    if provider.dimension() != config.elastic.dims {
        return Err(QueryError::DimensionMismatch {
            expected: config.elastic.dims,
            actual: provider.dimension(),
        });
    }

    let retry = RetryManager::with_config(
        config.retrieval.max_retries,
        config.retrieval.retry_base_delay_ms,
    );

    let client = Arc::new(ElasticClient::from_config(
        &config.elastic,
        config.query_timeout(),
    )?);

    let embedder = Arc::new(CachedEmbedder::new(
        provider,
        QueryCache::new(config.cache.capacity, config.cache_ttl()),
        retry.clone(),
        config.inference_timeout(),
    ));

    let lexical = Arc::new(EsLexicalRetriever::new(
        Arc::clone(&client),
        config.elastic.clone(),
        retry.clone(),
    ));
    let vector = Arc::new(EsVectorRetriever::new(client, config.elastic.clone(), retry));

    let mut pipeline = QueryPipeline::new(
        embedder,
        lexical,
        vector,
        ScoreFusion::new(config.fusion.clone()),
        PipelineSettings::from_config(config),
    );

    if config.cache.results_enabled {
        pipeline = pipeline.with_results_cache(config.cache.capacity, config.cache_ttl());
    }

    tracing::info!(
        host = %config.elastic.host,
        index = %config.elastic.index,
        dims = config.elastic.dims,
        strategy = ?config.fusion.strategy,
        "query pipeline ready"
    );

    Ok(pipeline)
}

/// Load the model and build the full pipeline
pub fn build_pipeline(config: &QueryConf) -> Result<QueryPipeline> {
    let engine = load_embedding_model(config)?;
    build_with_provider(config, Arc::new(engine))
}
