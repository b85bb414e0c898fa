//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and an HTTP implementation that talks to an
//! OpenAI-compatible embedding service. Two providers are built from configuration:
//! one for the sentence model behind semantic search ([`TEXT_EMBEDDING_DIM`]) and one
//! for the CLIP text encoder behind image search ([`IMAGE_EMBEDDING_DIM`]).

pub mod remote;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EmbeddingConfig;

/// Dimensions of the sentence embeddings stored in `memories_vec` (all-MiniLM-L6-v2).
pub const TEXT_EMBEDDING_DIM: usize = 384;

/// Dimensions of the CLIP embeddings stored in `memories_image_vec` (ViT-B/32).
pub const IMAGE_EMBEDDING_DIM: usize = 512;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors sized for the vec0 table they feed.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier. Recorded in `schema_meta` on startup so a later model switch
    /// can be detected.
    fn model(&self) -> &str;
}

/// Create the sentence embedding provider used for semantic search and the write path.
pub fn create_text_provider(config: &EmbeddingConfig) -> Result<remote::HttpEmbeddingProvider> {
    remote::HttpEmbeddingProvider::new(config, &config.text_model, TEXT_EMBEDDING_DIM)
}

/// Create the CLIP text-encoder provider used to query image embeddings.
pub fn create_image_text_provider(
    config: &EmbeddingConfig,
) -> Result<remote::HttpEmbeddingProvider> {
    remote::HttpEmbeddingProvider::new(config, &config.image_model, IMAGE_EMBEDDING_DIM)
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
