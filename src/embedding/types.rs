// Dense embedding vector and the provider seam
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{QueryError, Result};

/// Fixed-dimension dense vector; cloning shares the underlying buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct EmbeddingVector {
    values: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Wrap a fully computed vector; empty or non-finite vectors are rejected
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(QueryError::ModelUnavailable(
                "model produced an empty embedding".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(QueryError::ModelUnavailable(
                "model produced a non-finite embedding".to_string(),
            ));
        }
        Ok(Self {
            values: values.into(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Cosine similarity; 0.0 when either side has zero norm or dimensions differ
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> f32 {
        if self.dimension() != other.dimension() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

impl TryFrom<Vec<f32>> for EmbeddingVector {
    type Error = QueryError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        EmbeddingVector::new(values)
    }
}

impl From<EmbeddingVector> for Vec<f32> {
    fn from(vector: EmbeddingVector) -> Self {
        vector.values.to_vec()
    }
}

/// Turns text into a dense vector.
///
/// Implementations are shared across concurrent queries; the underlying
/// model must be read-only after load.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed non-empty text; every vector has [`EmbeddingProvider::dimension`] entries
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    fn dimension(&self) -> usize;

    /// Identifies the loaded model in cache keys
    fn model_version(&self) -> &str;
}
