// Cache-checked, time-bounded embedding front for the pipeline
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::cache::{CacheKey, CacheStats, QueryCache};
use crate::embedding::types::{EmbeddingProvider, EmbeddingVector};
use crate::errors::{QueryError, Result};
use crate::query::normalize_text;
use crate::retrieval::RetryManager;

/// Embedding provider wrapped with a single-flight cache, an inference
/// deadline and bounded retries.
///
/// Cache keys carry the provider's model version; [`CachedEmbedder::reload`]
/// swaps the model and drops vectors of the previous version.
pub struct CachedEmbedder {
    provider: RwLock<Arc<dyn EmbeddingProvider>>,
    cache: QueryCache<EmbeddingVector>,
    retry: RetryManager,
    inference_timeout: Duration,
}

impl CachedEmbedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: QueryCache<EmbeddingVector>,
        retry: RetryManager,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            provider: RwLock::new(provider),
            cache,
            retry,
            inference_timeout,
        }
    }

    fn current(&self) -> Arc<dyn EmbeddingProvider> {
        let guard = self
            .provider
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Embed text, computing at most once per (model version, normalized text)
    /// across concurrent callers
    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(QueryError::InputError(
                "cannot embed empty text".to_string(),
            ));
        }

        let provider = self.current();
        let key = CacheKey::new(provider.model_version(), normalized.clone());
        let retry = self.retry.clone();
        let deadline = self.inference_timeout;

        self.cache
            .get_or_compute(key, move || async move {
                retry
                    .execute_with_retry(|| {
                        let provider = Arc::clone(&provider);
                        let text = normalized.clone();
                        async move {
                            match tokio::time::timeout(deadline, provider.embed(&text)).await {
                                Ok(outcome) => outcome,
                                Err(_) => Err(QueryError::InferenceTimeout {
                                    duration_ms: deadline.as_millis() as u64,
                                }),
                            }
                        }
                    })
                    .await
            })
            .await
    }

    /// Replace the model; cached vectors of the old version are invalidated
    /// when the version changes
    pub fn reload(&self, provider: Arc<dyn EmbeddingProvider>) {
        let previous = {
            let mut guard = self
                .provider
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, provider)
        };

        let new_version = self.model_version();
        if previous.model_version() != new_version {
            let dropped = self.cache.invalidate_namespace(previous.model_version());
            tracing::info!(
                old_version = %previous.model_version(),
                new_version = %new_version,
                dropped,
                "embedding model reloaded"
            );
        }
    }

    pub fn dimension(&self) -> usize {
        self.current().dimension()
    }

    pub fn model_version(&self) -> String {
        self.current().model_version().to_string()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
