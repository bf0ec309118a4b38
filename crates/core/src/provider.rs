//! Provider trait: the abstraction over hosted LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of tokens. It also
//! exposes the lightweight model listing used to validate credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::error::ProviderError;
use crate::message::Message;

/// One chat-completion call against a single model of the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Chain entry being tried, e.g. "gpt-4o-mini"
    pub model: String,

    /// System prompt followed by the visitor's question
    pub messages: Vec<Message>,

    /// Sampling temperature, 0.0 to 2.0
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion length cap; `None` leaves it to the upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A buffered completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message: Message,
    pub usage: Option<Usage>,

    /// Model name the upstream reports, which can be a dated alias of the
    /// requested one
    pub model: String,
}

/// Token accounting reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One server-sent delta of a streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: Option<String>,

    /// Set on the terminating chunk only
    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Receiving half of a live token stream.
pub type TokenReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// Batch embedding call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,

    pub model: String,
}

/// A hosted chat backend.
///
/// The orchestrator only ever sees `&dyn Provider`; which backend answers is
/// decided by the [`ProviderFactory`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend label used in logs, e.g. "openai".
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Open a token stream. Backends without native streaming fall back to
    /// one `complete()` call delivered as a single terminating chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<TokenReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(StreamChunk {
            content: Some(response.message.content),
            done: true,
            usage: response.usage,
        })).await;
        Ok(rx)
    }

    /// Embed `inputs`. Unsupported unless a backend overrides it.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            format!("Provider '{}' does not support embeddings", self.name()),
        ))
    }

    /// Model ids the credential can use. The vault calls this to validate
    /// keys, so a backend that cannot list models cannot vouch for one.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Err(ProviderError::NotConfigured(
            format!("Provider '{}' cannot list models", self.name()),
        ))
    }
}

/// Builds a provider bound to a specific API credential.
///
/// Each site visitor brings their own key, so providers are created per
/// request from whatever the vault hands back.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, api_key: &str) -> Arc<dyn Provider>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"gpt-4o-mini","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.stream);
        assert!(req.max_tokens.is_none());
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let mut rx = Echo
            .stream(ProviderRequest {
                model: "m".into(),
                messages: vec![Message::user("ping")],
                temperature: 0.0,
                max_tokens: None,
                stream: true,
            })
            .await
            .unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("ping"));
        assert!(chunk.done);
    }

    #[tokio::test]
    async fn default_embed_is_not_configured() {
        let err = Echo
            .embed(EmbeddingRequest { model: "e".into(), inputs: vec!["x".into()] })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn default_list_models_is_not_configured() {
        let err = Echo.list_models().await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
