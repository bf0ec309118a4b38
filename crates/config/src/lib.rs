//! Configuration loading, validation, and management for Persona.
//!
//! Loads configuration from `~/.persona/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.persona/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site-owned API key, used for embeddings and the knowledge corpus.
    /// Visitors' keys live in the credential vault, never here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upstream provider endpoint
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Retry / fallback / timeout behaviour
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Credential vault settings
    #[serde(default)]
    pub vault: VaultConfig,

    /// Knowledge store settings and seed corpus
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Prompt and conversation settings
    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("orchestrator", &self.orchestrator)
            .field("vault", &self.vault)
            .field("knowledge", &self.knowledge)
            .field("assistant", &self.assistant)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Models in priority order: primary first, fallbacks after.
    #[serde(default = "default_model_chain")]
    pub model_chain: Vec<String>,

    /// Number of rounds over the whole chain.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before round `n + 1` is `base_delay_ms * 2^n`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Bound on each individual upstream call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Extra HTTP statuses that abort the chain instead of retrying.
    #[serde(default = "default_non_retryable_status_codes")]
    pub non_retryable_status_codes: Vec<u16>,

    /// Case-insensitive message fragments that abort the chain.
    #[serde(default = "default_non_retryable_patterns")]
    pub non_retryable_patterns: Vec<String>,
}

fn default_model_chain() -> Vec<String> {
    vec!["gpt-4o-mini".into(), "gpt-3.5-turbo".into()]
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    8000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_non_retryable_status_codes() -> Vec<u16> {
    vec![401, 402, 403]
}
fn default_non_retryable_patterns() -> Vec<String> {
    vec![
        "invalid api key".into(),
        "incorrect api key".into(),
        "insufficient_quota".into(),
    ]
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model_chain: default_model_chain(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            non_retryable_status_codes: default_non_retryable_status_codes(),
            non_retryable_patterns: default_non_retryable_patterns(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// 64 hex characters (raw key) or a passphrase hashed into one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,

    /// "file" or "memory"
    #[serde(default = "default_vault_store")]
    pub store: String,

    /// Override for the credentials file (default `~/.persona/credentials.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
}

fn default_vault_store() -> String {
    "file".into()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            store: default_vault_store(),
            store_path: None,
        }
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_key", &redact(&self.master_key))
            .field("store", &self.store)
            .field("store_path", &self.store_path)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// How many documents the prompt builder pulls per query.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Corpus embedded at startup.
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
}

fn default_search_limit() -> usize {
    3
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            documents: Vec::new(),
        }
    }
}

/// A seed document declared in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Instructional preamble placed at the top of every system prompt.
    #[serde(default = "default_preamble")]
    pub preamble: String,

    /// Most-recent history messages rendered into the prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Conversations kept in the in-memory cache before the oldest is evicted.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
}

fn default_preamble() -> String {
    "You are the AI assistant on a personal website. Answer questions about the site \
     owner's work, projects, and experience. Ground your answers in the context \
     documents below; if they do not cover the question, say so plainly instead of \
     guessing. Keep answers concise and friendly."
        .into()
}
fn default_history_limit() -> usize {
    20
}
fn default_max_conversations() -> usize {
    1000
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            preamble: default_preamble(),
            history_limit: default_history_limit(),
            max_conversations: default_max_conversations(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.persona/config.toml)
    /// and apply environment overrides:
    /// - `PERSONA_API_KEY`, then `OPENAI_API_KEY` (site key)
    /// - `PERSONA_VAULT_KEY` (vault master key)
    /// - `PERSONA_BASE_URL` (provider endpoint)
    /// - `PERSONA_MODELS` (comma-separated model chain)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Env values win over file values, except the site key which only fills
    /// a gap.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("PERSONA_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(key) = lookup("PERSONA_VAULT_KEY") {
            self.vault.master_key = Some(key);
        }

        if let Some(url) = lookup("PERSONA_BASE_URL") {
            self.provider.base_url = url;
        }

        if let Some(models) = lookup("PERSONA_MODELS") {
            let chain: Vec<String> = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            if !chain.is_empty() {
                self.orchestrator.model_chain = chain;
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".persona")
    }

    /// Where the file-backed credential store lives.
    pub fn credentials_path(&self) -> PathBuf {
        self.vault
            .store_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("credentials.json"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let orch = &self.orchestrator;

        if orch.temperature < 0.0 || orch.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if orch.model_chain.is_empty() {
            return Err(ConfigError::ValidationError(
                "orchestrator.model_chain must name at least one model".into(),
            ));
        }

        if orch.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_retries must be at least 1".into(),
            ));
        }

        if orch.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.timeout_secs must be > 0".into(),
            ));
        }

        if self.knowledge.search_limit == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.search_limit must be > 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for doc in &self.knowledge.documents {
            if !seen.insert(doc.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate knowledge document id: {}",
                    doc.id
                )));
            }
        }

        if !matches!(self.vault.store.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "vault.store must be \"file\" or \"memory\", got \"{}\"",
                self.vault.store
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ProviderSettings::default(),
            orchestrator: OrchestratorConfig::default(),
            vault: VaultConfig::default(),
            knowledge: KnowledgeConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
