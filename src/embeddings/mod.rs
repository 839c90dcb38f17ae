// Embeddings module
// Text -> vector conversion behind a trait, plus the bounded batch driver used at build time

pub mod batch;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use batch::{BatchEmbedder, EmbeddingInput};

/// Why a single embedding could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    #[error("embedding service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// An [`EmbeddingError`] tagged with the source of the text that failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_id}: {error}")]
pub struct FailedEmbedding {
    pub source_id: String,
    pub error: EmbeddingError,
}

/// Maps text to a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }
}

/// Reject empty vectors and vectors with NaN or infinite components
#[inline]
pub fn check_vector(vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::MalformedResponse(
            "embedding is empty".to_string(),
        ));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::MalformedResponse(format!(
            "embedding component {} is not finite",
            pos
        )));
    }
    Ok(())
}
