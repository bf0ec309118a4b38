//! Embedder trait: turns text into a fixed-length vector.
//!
//! The knowledge store never talks to a provider directly; it is handed an
//! `Embedder` so tests can substitute a deterministic one.

use async_trait::async_trait;
use crate::error::ProviderError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text into a vector.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
}
