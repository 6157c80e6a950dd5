// Sentence-embedding engine: BERT-family encoder loaded from EMBEDDINGS_MODEL_PATH via Candle
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};

use crate::embedding::types::{EmbeddingProvider, EmbeddingVector};
use crate::errors::{QueryError, Result};
use crate::query::normalize_text;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Load-time options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub model_version: String,
    pub max_sequence_len: usize,
    /// L2-normalize pooled vectors
    pub normalize: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            model_version: "unversioned".to_string(),
            max_sequence_len: 256,
            normalize: true,
        }
    }
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    normalize: bool,
}

/// Embedding engine over a local BERT checkpoint
pub struct BertEmbeddingEngine {
    loaded: Arc<LoadedModel>,
    dimension: usize,
    model_version: String,
}

/// Files a model directory must contain
pub fn model_files(model_dir: &Path) -> [PathBuf; 3] {
    [
        model_dir.join(CONFIG_FILE),
        model_dir.join(TOKENIZER_FILE),
        model_dir.join(WEIGHTS_FILE),
    ]
}

impl BertEmbeddingEngine {
    /// Load config, tokenizer and weights from `model_dir`.
    ///
    /// Any missing or unreadable artifact is `ModelUnavailable`; callers treat
    /// that as fatal at startup.
    pub fn load(model_dir: &Path, options: EngineOptions) -> Result<Self> {
        let device = Device::Cpu;

        let [config_path, tokenizer_path, weights_path] = model_files(model_dir);
        for path in [&config_path, &tokenizer_path, &weights_path] {
            if !path.is_file() {
                return Err(QueryError::ModelUnavailable(format!(
                    "missing model file {}",
                    path.display()
                )));
            }
        }

        let config_contents = std::fs::read_to_string(&config_path).map_err(|e| {
            QueryError::ModelUnavailable(format!("Failed to read model config: {}", e))
        })?;
        let config: Config = serde_json::from_str(&config_contents).map_err(|e| {
            QueryError::ModelUnavailable(format!("Failed to parse model config: {}", e))
        })?;
        let dimension = config.hidden_size;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            QueryError::ModelUnavailable(format!("Failed to load tokenizer: {}", e))
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: options.max_sequence_len,
                ..Default::default()
            }))
            .map_err(|e| {
                QueryError::ModelUnavailable(format!("Failed to configure tokenizer: {}", e))
            })?;
        tokenizer.with_padding(None);

        // SAFETY: the weights file is opened read-only and not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device).map_err(
                |e| QueryError::ModelUnavailable(format!("Failed to load model weights: {}", e)),
            )?
        };

        let model = BertModel::load(vb, &config).map_err(|e| {
            QueryError::ModelUnavailable(format!("Failed to create BERT model: {}", e))
        })?;

        tracing::info!(
            model_dir = %model_dir.display(),
            dimension,
            model_version = %options.model_version,
            "embedding model loaded"
        );

        Ok(Self {
            loaded: Arc::new(LoadedModel {
                model,
                tokenizer,
                device,
                normalize: options.normalize,
            }),
            dimension,
            model_version: options.model_version,
        })
    }
}

impl LoadedModel {
    /// Synchronous batched inference; CPU-bound
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| QueryError::InputError(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|encoding| encoding.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = texts.len();

        // Pad sequences to the longest in the batch
        let mut flat_ids = vec![0u32; batch_size * max_len];
        let mut flat_mask = vec![0u32; batch_size * max_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            flat_ids[i * max_len..i * max_len + ids.len()].copy_from_slice(ids);
            flat_mask[i * max_len..i * max_len + mask.len()].copy_from_slice(mask);
        }

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = token_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let mut pooled = mean_pool(&hidden, &attention_mask)?;
        if self.normalize {
            pooled = l2_normalize(&pooled)?;
        }

        Ok(pooled.to_vec2::<f32>()?)
    }
}

/// Mean pooling with attention mask
fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask_expanded = attention_mask
        .unsqueeze(2)?
        .expand(embeddings.shape())?
        .to_dtype(embeddings.dtype())?;

    let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

    sum_embeddings.broadcast_div(&sum_mask)
}

fn l2_normalize(pooled: &Tensor) -> candle_core::Result<Tensor> {
    let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
    pooled.broadcast_div(&norms)
}

#[async_trait]
impl EmbeddingProvider for BertEmbeddingEngine {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let text = normalize_text(text);
        if text.is_empty() {
            return Err(QueryError::InputError(
                "cannot embed empty text".to_string(),
            ));
        }

        let loaded = Arc::clone(&self.loaded);
        let mut vectors = tokio::task::spawn_blocking(move || loaded.embed_batch(&[text.as_str()]))
            .await
            .map_err(|e| QueryError::ModelUnavailable(format!("inference task failed: {}", e)))??;

        let values = vectors.pop().ok_or_else(|| {
            QueryError::ModelUnavailable("model returned no embedding".to_string())
        })?;

        if values.len() != self.dimension {
            return Err(QueryError::DimensionMismatch {
                expected: self.dimension,
                actual: values.len(),
            });
        }

        EmbeddingVector::new(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}
