//! Shared test doubles for the assistant tests.

use async_trait::async_trait;
use persona_core::embedding::Embedder;
use persona_core::error::ProviderError;
use persona_core::message::Message;
use persona_core::provider::{
    Provider, ProviderFactory, ProviderRequest, ProviderResponse, StreamChunk, TokenReceiver, Usage,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const VOCABULARY: [&str; 6] = ["rust", "mcp", "agent", "music", "protocol", "cooking"];

/// Bag-of-words embedder over a tiny fixed vocabulary.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let lower = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect())
    }
}

/// How a scripted stream finishes after its last word.
pub enum StreamEnd {
    Done,
    Fail(ProviderError),
    /// The sender is dropped with no done marker.
    Closed,
}

/// Keys starting with this prefix pass the model-list check.
pub const VALID_KEY_PREFIX: &str = "sk-valid";

/// One scripted upstream shared by every connection the factory hands out.
///
/// `complete` pops the next scripted result; an empty script answers "ok".
#[derive(Default)]
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    stream_ends: Mutex<VecDeque<StreamEnd>>,
    calls: Mutex<Vec<ProviderRequest>>,
    keys: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, text: &str) {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Ending for the next stream; unscripted streams finish with `Done`.
    pub fn push_stream_end(&self, end: StreamEnd) {
        self.stream_ends.lock().unwrap().push_back(end);
    }

    pub fn calls(&self) -> Vec<ProviderRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.model).collect()
    }

    pub fn keys_seen(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Result<(String, String), ProviderError> {
        let model = request.model.clone();
        self.calls.lock().unwrap().push(request);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok("ok".into())).map(|text| (model, text))
    }
}

pub struct ScriptedFactory(pub Arc<ScriptedUpstream>);

impl ProviderFactory for ScriptedFactory {
    fn connect(&self, api_key: &str) -> Arc<dyn Provider> {
        self.0.keys.lock().unwrap().push(api_key.to_string());
        Arc::new(Connection {
            key: api_key.to_string(),
            upstream: self.0.clone(),
        })
    }
}

struct Connection {
    key: String,
    upstream: Arc<ScriptedUpstream>,
}

fn usage() -> Usage {
    Usage {
        prompt_tokens: 12,
        completion_tokens: 3,
        total_tokens: 15,
    }
}

#[async_trait]
impl Provider for Connection {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let (model, text) = self.upstream.next(request)?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(usage()),
            model,
        })
    }

    /// Streams the scripted text word by word, then the scripted ending.
    async fn stream(&self, request: ProviderRequest) -> Result<TokenReceiver, ProviderError> {
        let (_, text) = self.upstream.next(request)?;
        let words: Vec<String> = text.split_inclusive(' ').map(String::from).collect();
        let (tx, rx) = tokio::sync::mpsc::channel(words.len() + 1);
        for word in words {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(word),
                    done: false,
                    usage: None,
                }))
                .await;
        }
        let end = self.upstream.stream_ends.lock().unwrap().pop_front();
        match end.unwrap_or(StreamEnd::Done) {
            StreamEnd::Done => {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: None,
                        done: true,
                        usage: Some(usage()),
                    }))
                    .await;
            }
            StreamEnd::Fail(error) => {
                let _ = tx.send(Err(error)).await;
            }
            StreamEnd::Closed => {}
        }
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        if self.key.starts_with(VALID_KEY_PREFIX) {
            Ok(vec!["gpt-4o-mini".into(), "gpt-3.5-turbo".into()])
        } else {
            Err(ProviderError::AuthenticationFailed("Incorrect API key provided".into()))
        }
    }
}
