//! Embedding provider seam.

use async_trait::async_trait;
use thiserror::Error;

/// Dimensionality of every stored embedding vector. Vectors of any other
/// length are not eligible for similarity search.
pub const EMBEDDING_DIMENSIONS: usize = 1024;

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Empty or whitespace-only input. Never retried.
    #[error("cannot embed empty text")]
    InvalidInput,

    /// Transport failure or malformed provider payload. Retrieval callers
    /// map this to empty results and continue.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
}

/// One-shot text embedding.
///
/// The same text yields the same vector (within provider determinism), and
/// every returned vector has exactly [`EMBEDDING_DIMENSIONS`] finite
/// entries.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Validate a provider-returned vector against the dimension and
/// finiteness contract.
pub fn validate_vector(vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.len() != EMBEDDING_DIMENSIONS {
        return Err(EmbeddingError::Unavailable(format!(
            "provider returned {} dimensions, expected {}",
            vector.len(),
            EMBEDDING_DIMENSIONS
        )));
    }
    if vector.iter().any(|value| !value.is_finite()) {
        return Err(EmbeddingError::Unavailable(
            "provider returned non-finite values".to_string(),
        ));
    }
    Ok(())
}
