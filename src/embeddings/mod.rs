// Embedding generation module
// Defines the provider seam used by indexing and retrieval

pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;

/// Converts batches of texts into fixed-length embedding vectors.
///
/// Implementations preserve input order and fail as a single unit: a call
/// either returns one vector per input text or a single error with no
/// partial results.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed all texts, batching internally as needed
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the underlying embedding model
    fn model_id(&self) -> &str;

    /// Dimensionality of the vectors this provider produces
    fn dimensions(&self) -> usize;
}
