//! The assistant façade: one chat request from credential to answer.
//!
//! Control flow per request:
//! 1. The vault hands back the owner's usable credential (or nothing).
//! 2. The knowledge store is searched for the latest user question.
//! 3. The prompt builder assembles the system prompt.
//! 4. The orchestrator runs the model chain with retry and fallback.

use crate::conversation::ConversationCache;
use crate::prompt::PromptBuilder;
use crate::stream_event::ChatStreamEvent;
use persona_config::AppConfig;
use persona_core::error::{KnowledgeError, ProviderError, VaultError};
use persona_core::message::{ConversationId, Message, Role};
use persona_core::provider::{Provider, ProviderFactory, TokenReceiver, Usage};
use persona_memory::KnowledgeStore;
use persona_providers::{GenerationFailure, GenerationOptions, GenerationOrchestrator};
use persona_security::{CredentialStatus, CredentialVault, RemoveOutcome, StoreOutcome, Validation};
use persona_telemetry::{HealthReport, HealthStatus, HealthTracker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-request overrides. Unset fields fall back to the assistant defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatOptions {
    #[serde(default)]
    pub model_chain: Option<Vec<String>>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl ChatOptions {
    fn resolve(&self, defaults: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            model_chain: self
                .model_chain
                .clone()
                .unwrap_or_else(|| defaults.model_chain.clone()),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
        }
    }
}

/// A successful chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    pub attempt: u32,
    pub calls: u32,
    pub usage: Option<Usage>,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request contains no user message")]
    EmptyRequest,

    #[error("no usable credential for owner '{0}'")]
    NoCredential(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    Generation(#[from] GenerationFailure),
}

impl ChatError {
    /// Short machine-readable kind for the `error` field of a [`ChatOutcome`].
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyRequest => "invalid_request",
            Self::NoCredential(_) => "no_credential",
            Self::Vault(_) => "vault_error",
            Self::Knowledge(_) => "knowledge_error",
            Self::Generation(failure) => failure.error.kind(),
        }
    }
}

/// Structured, serializable result of a chat call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl From<Result<ChatReply, ChatError>> for ChatOutcome {
    fn from(result: Result<ChatReply, ChatError>) -> Self {
        match result {
            Ok(reply) => Self {
                success: true,
                response: Some(reply.content),
                error: None,
                details: None,
                model: Some(reply.model),
                usage: reply.usage,
                attempt: Some(reply.attempt),
            },
            Err(e) => Self {
                success: false,
                response: None,
                error: Some(e.kind().to_string()),
                details: Some(e.to_string()),
                model: None,
                usage: None,
                attempt: match &e {
                    ChatError::Generation(f) => Some(f.attempts),
                    _ => None,
                },
            },
        }
    }
}

/// A streamed reply. Fallback is over once this exists; later upstream
/// errors surface as a single [`ChatStreamEvent::Error`].
pub struct ChatStream {
    receiver: TokenReceiver,
    model: String,
    attempt: u32,
    calls: u32,
    pending: Option<ChatStreamEvent>,
    finished: bool,
}

impl ChatStream {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Next event, or `None` after a terminal event has been returned.
    pub async fn next_event(&mut self) -> Option<ChatStreamEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        if self.finished {
            return None;
        }

        loop {
            let event = match self.receiver.recv().await {
                Some(Ok(chunk)) => {
                    let content = chunk.content.filter(|c| !c.is_empty());
                    if chunk.done {
                        self.finished = true;
                        let done = self.done_event(chunk.usage);
                        match content {
                            Some(content) => {
                                self.pending = Some(done);
                                ChatStreamEvent::Chunk { content }
                            }
                            None => done,
                        }
                    } else {
                        match content {
                            Some(content) => ChatStreamEvent::Chunk { content },
                            None => continue,
                        }
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    ChatStreamEvent::Error {
                        message: e.to_string(),
                    }
                }
                // Sender dropped without a done marker.
                None => {
                    self.finished = true;
                    ChatStreamEvent::Error {
                        message: ProviderError::StreamInterrupted(
                            "stream closed before completion".into(),
                        )
                        .to_string(),
                    }
                }
            };
            return Some(event);
        }
    }

    /// Adapt into a `futures::Stream` of events.
    pub fn into_stream(self) -> impl futures::Stream<Item = ChatStreamEvent> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_event().await.map(|event| (event, stream))
        })
    }

    fn done_event(&self, usage: Option<Usage>) -> ChatStreamEvent {
        ChatStreamEvent::Done {
            model: self.model.clone(),
            attempt: self.attempt,
            usage,
        }
    }
}

/// Operations on an owner's stored credential.
#[derive(Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CredentialAction {
    Store { api_key: String },
    Revalidate,
    Remove,
    Status,
}

impl std::fmt::Debug for CredentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store { .. } => f.write_str("Store { api_key: \"[REDACTED]\" }"),
            Self::Revalidate => f.write_str("Revalidate"),
            Self::Remove => f.write_str("Remove"),
            Self::Status => f.write_str("Status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CredentialActionResult {
    Stored(StoreOutcome),
    Revalidated(Validation),
    Removed(RemoveOutcome),
    Status(CredentialStatus),
}

pub struct Assistant {
    vault: Arc<CredentialVault>,
    providers: Arc<dyn ProviderFactory>,
    prompts: PromptBuilder,
    orchestrator: GenerationOrchestrator,
    conversations: ConversationCache,
    defaults: GenerationOptions,
    service_key: Option<String>,
}

impl Assistant {
    pub fn new(
        vault: Arc<CredentialVault>,
        providers: Arc<dyn ProviderFactory>,
        prompts: PromptBuilder,
        orchestrator: GenerationOrchestrator,
    ) -> Self {
        Self {
            vault,
            providers,
            prompts,
            orchestrator,
            conversations: ConversationCache::new(1000, crate::prompt::DEFAULT_HISTORY_LIMIT),
            defaults: GenerationOptions::default(),
            service_key: None,
        }
    }

    /// Wire an assistant from loaded configuration.
    pub fn from_config(
        config: &AppConfig,
        vault: Arc<CredentialVault>,
        providers: Arc<dyn ProviderFactory>,
        knowledge: Arc<KnowledgeStore>,
        health: Arc<HealthTracker>,
    ) -> Self {
        let prompts = PromptBuilder::new(knowledge, config.assistant.preamble.clone())
            .with_search_limit(config.knowledge.search_limit)
            .with_history_limit(config.assistant.history_limit);
        let orchestrator = GenerationOrchestrator::from_config(&config.orchestrator, health);

        let mut assistant = Self::new(vault, providers, prompts, orchestrator)
            .with_defaults(GenerationOptions::from(&config.orchestrator))
            .with_conversations(ConversationCache::new(
                config.assistant.max_conversations,
                config.assistant.history_limit,
            ));
        assistant.service_key = config.api_key.clone();
        assistant
    }

    pub fn with_defaults(mut self, defaults: GenerationOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_conversations(mut self, conversations: ConversationCache) -> Self {
        self.conversations = conversations;
        self
    }

    /// Operator key used by [`Assistant::health_check`].
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        self.prompts.knowledge()
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub fn conversations(&self) -> &ConversationCache {
        &self.conversations
    }

    /// Answer the latest user message in `messages`, as a structured outcome.
    pub async fn chat(&self, owner_id: &str, messages: &[Message], options: &ChatOptions) -> ChatOutcome {
        self.respond(owner_id, messages, options).await.into()
    }

    /// Same as [`Assistant::chat`] but keeps the typed error.
    pub async fn respond(
        &self,
        owner_id: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatReply, ChatError> {
        let (provider, request) = self.prepare(owner_id, messages).await?;
        let options = options.resolve(&self.defaults);

        match self.orchestrator.generate(provider.as_ref(), &request, &options).await {
            Ok(generation) => {
                info!(
                    owner = %owner_id,
                    model = %generation.model,
                    attempt = generation.attempt,
                    "Chat answered"
                );
                Ok(ChatReply {
                    content: generation.response.message.content,
                    model: generation.model,
                    attempt: generation.attempt,
                    calls: generation.calls,
                    usage: generation.response.usage,
                    elapsed: generation.elapsed,
                })
            }
            Err(failure) => {
                warn!(owner = %owner_id, error = %failure, "Chat failed");
                Err(failure.into())
            }
        }
    }

    /// Streaming variant of [`Assistant::respond`].
    pub async fn chat_stream(
        &self,
        owner_id: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatStream, ChatError> {
        let (provider, request) = self.prepare(owner_id, messages).await?;
        let options = options.resolve(&self.defaults);

        let opened = self
            .orchestrator
            .generate_stream(provider.as_ref(), &request, &options)
            .await?;
        info!(owner = %owner_id, model = %opened.model, attempt = opened.attempt, "Chat stream opened");

        Ok(ChatStream {
            receiver: opened.receiver,
            model: opened.model,
            attempt: opened.attempt,
            calls: opened.calls,
            pending: None,
            finished: false,
        })
    }

    /// One turn in a cached conversation. The exchange is only remembered
    /// when the turn succeeds.
    pub async fn chat_in_conversation(
        &self,
        owner_id: &str,
        conversation_id: &ConversationId,
        text: &str,
    ) -> ChatOutcome {
        let mut messages = self.conversations.history(conversation_id).await;
        let question = Message::user(text);
        messages.push(question.clone());

        let result = self.respond(owner_id, &messages, &ChatOptions::default()).await;
        if let Ok(reply) = &result {
            self.conversations
                .record(conversation_id, [question, Message::assistant(reply.content.clone())])
                .await;
        }
        result.into()
    }

    pub async fn manage_credential(
        &self,
        owner_id: &str,
        action: CredentialAction,
    ) -> Result<CredentialActionResult, ChatError> {
        let result = match action {
            CredentialAction::Store { api_key } => {
                CredentialActionResult::Stored(self.vault.store(owner_id, &api_key).await?)
            }
            CredentialAction::Revalidate => {
                CredentialActionResult::Revalidated(self.vault.revalidate(owner_id).await?)
            }
            CredentialAction::Remove => CredentialActionResult::Removed(self.vault.remove(owner_id).await?),
            CredentialAction::Status => CredentialActionResult::Status(self.vault.status(owner_id).await?),
        };
        Ok(result)
    }

    /// Probe the primary model with the service key.
    pub async fn health_check(&self) -> HealthReport {
        let Some(key) = self.service_key.as_deref() else {
            return HealthReport::Unhealthy {
                model: self.defaults.model_chain.first().cloned().unwrap_or_default(),
                error: "no service API key configured".into(),
            };
        };
        let provider = self.providers.connect(key);
        self.orchestrator.health_check(provider.as_ref(), &self.defaults).await
    }

    /// Probe the primary model with an owner's stored credential.
    pub async fn health_check_for(&self, owner_id: &str) -> Result<HealthReport, ChatError> {
        let key = self
            .vault
            .retrieve(owner_id)
            .await?
            .ok_or_else(|| ChatError::NoCredential(owner_id.to_string()))?;
        let provider = self.providers.connect(&key);
        Ok(self.orchestrator.health_check(provider.as_ref(), &self.defaults).await)
    }

    pub fn health(&self) -> HealthStatus {
        self.orchestrator.health()
    }

    /// Resolve the credential and build the upstream message list:
    /// the assembled system prompt followed by the latest user message.
    async fn prepare(
        &self,
        owner_id: &str,
        messages: &[Message],
    ) -> Result<(Arc<dyn Provider>, Vec<Message>), ChatError> {
        let position = messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .filter(|&i| !messages[i].content.trim().is_empty())
            .ok_or(ChatError::EmptyRequest)?;

        let key = self
            .vault
            .retrieve(owner_id)
            .await?
            .ok_or_else(|| ChatError::NoCredential(owner_id.to_string()))?;

        let query = &messages[position].content;
        let prompt = self.prompts.build_prompt(query, &messages[..position]).await?;

        Ok((
            self.providers.connect(&key),
            vec![Message::system(prompt), Message::user(query.clone())],
        ))
    }
}
