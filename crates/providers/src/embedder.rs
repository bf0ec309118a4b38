//! Adapts a [`Provider`]'s embeddings endpoint to the single-text [`Embedder`] seam.

use async_trait::async_trait;
use persona_core::embedding::Embedder;
use persona_core::error::ProviderError;
use persona_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;

pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await?;

        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: format!("'{}' returned no embedding", self.provider.name()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::message::Message;
    use persona_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};
    use std::sync::Mutex;

    struct FixedEmbeddings {
        vectors: Vec<Vec<f32>>,
        seen: Mutex<Vec<EmbeddingRequest>>,
    }

    #[async_trait]
    impl Provider for FixedEmbeddings {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(""),
                usage: None,
                model: request.model,
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            let model = request.model.clone();
            self.seen.lock().unwrap().push(request);
            Ok(EmbeddingResponse {
                embeddings: self.vectors.clone(),
                model,
            })
        }
    }

    #[tokio::test]
    async fn returns_first_vector_and_passes_model() {
        let provider = Arc::new(FixedEmbeddings {
            vectors: vec![vec![0.1, 0.2]],
            seen: Mutex::new(Vec::new()),
        });
        let embedder = ProviderEmbedder::new(provider.clone(), "text-embedding-3-small");

        assert_eq!(embedder.embed("hello").await.unwrap(), vec![0.1, 0.2]);
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].model, "text-embedding-3-small");
        assert_eq!(seen[0].inputs, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let provider = Arc::new(FixedEmbeddings {
            vectors: vec![],
            seen: Mutex::new(Vec::new()),
        });
        let embedder = ProviderEmbedder::new(provider, "m");
        assert!(matches!(
            embedder.embed("hello").await,
            Err(ProviderError::ApiError { .. })
        ));
    }
}
