//! Wires the loaded configuration into a ready [`Assistant`].

use async_trait::async_trait;
use persona_agent::Assistant;
use persona_config::AppConfig;
use persona_core::embedding::Embedder;
use persona_core::error::ProviderError;
use persona_core::provider::ProviderFactory;
use persona_memory::{KnowledgeStore, NewDocument};
use persona_providers::{OpenAiCompatFactory, ProviderEmbedder};
use persona_security::{
    CredentialCipher, CredentialStore, CredentialVault, FileCredentialStore,
    InMemoryCredentialStore,
};
use persona_telemetry::HealthTracker;
use std::sync::Arc;

pub struct Runtime {
    pub config: AppConfig,
    pub assistant: Assistant,
}

fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

impl Runtime {
    /// Full runtime with the configured documents embedded and indexed.
    pub async fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_config(load_config()?).await
    }

    /// Runtime for commands that never search; the knowledge store stays
    /// empty so no embedding calls are made.
    pub fn load_without_knowledge() -> Result<Self, Box<dyn std::error::Error>> {
        Self::without_knowledge(load_config()?)
    }

    pub async fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let factory = build_factory(&config)?;
        let knowledge = build_knowledge(&config, factory.as_ref());
        seed_knowledge(&config, &knowledge).await?;
        Self::assemble(config, factory, knowledge)
    }

    pub fn without_knowledge(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let factory = build_factory(&config)?;
        let knowledge = build_knowledge(&config, factory.as_ref());
        Self::assemble(config, factory, knowledge)
    }

    fn assemble(
        config: AppConfig,
        factory: Arc<dyn ProviderFactory>,
        knowledge: KnowledgeStore,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let vault = Arc::new(build_vault(&config, factory.clone())?);
        let assistant = Assistant::from_config(
            &config,
            vault,
            factory,
            Arc::new(knowledge),
            Arc::new(HealthTracker::new()),
        );
        Ok(Self { config, assistant })
    }
}

fn build_factory(config: &AppConfig) -> Result<Arc<dyn ProviderFactory>, Box<dyn std::error::Error>> {
    Ok(Arc::new(OpenAiCompatFactory::new(
        config.provider.name.clone(),
        config.provider.base_url.clone(),
    )?))
}

pub fn open_store(config: &AppConfig) -> Result<Arc<dyn CredentialStore>, Box<dyn std::error::Error>> {
    Ok(match config.vault.store.as_str() {
        "memory" => Arc::new(InMemoryCredentialStore::new()),
        _ => Arc::new(FileCredentialStore::open(config.credentials_path())?),
    })
}

fn build_vault(
    config: &AppConfig,
    factory: Arc<dyn ProviderFactory>,
) -> Result<CredentialVault, Box<dyn std::error::Error>> {
    let master_key = config.vault.master_key.as_deref().ok_or(
        "No vault master key configured. Set PERSONA_VAULT_KEY or [vault].master_key in config.toml",
    )?;
    let cipher = CredentialCipher::from_master_key(master_key)?;
    Ok(CredentialVault::new(cipher, open_store(config)?, factory))
}

fn build_knowledge(config: &AppConfig, factory: &dyn ProviderFactory) -> KnowledgeStore {
    let embedder: Arc<dyn Embedder> = match config.api_key.as_deref() {
        Some(key) => Arc::new(ProviderEmbedder::new(
            factory.connect(key),
            config.provider.embedding_model.clone(),
        )),
        None => Arc::new(MissingKeyEmbedder),
    };
    KnowledgeStore::new(embedder)
}

async fn seed_knowledge(
    config: &AppConfig,
    store: &KnowledgeStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let documents: Vec<NewDocument> = config
        .knowledge
        .documents
        .iter()
        .map(|d| NewDocument::new(&d.id, &d.title, &d.content).with_tags(d.tags.clone()))
        .collect();
    if !documents.is_empty() {
        store
            .seed(documents)
            .await
            .map_err(|e| format!("Failed to seed knowledge store: {e}"))?;
    }
    Ok(())
}

/// Stands in when no site key is configured; any embedding attempt fails.
struct MissingKeyEmbedder;

#[async_trait]
impl Embedder for MissingKeyEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::NotConfigured(
            "no site API key for embeddings; set PERSONA_API_KEY or api_key in config.toml".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_agent::{CredentialAction, CredentialActionResult};
    use persona_config::DocumentConfig;

    /// No site key, so any embedding attempt fails.
    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.api_key = None;
        config.vault.master_key = Some("runtime test passphrase".into());
        config.vault.store = "memory".into();
        config.knowledge.documents = vec![DocumentConfig {
            id: "about".into(),
            title: "About".into(),
            content: "The owner writes Rust.".into(),
            tags: vec![],
        }];
        config
    }

    #[tokio::test]
    async fn seeding_needs_embeddings() {
        let err = Runtime::from_config(offline_config()).await.err().unwrap();
        assert!(err.to_string().contains("Failed to seed knowledge store"));
    }

    #[tokio::test]
    async fn credential_commands_skip_seeding() {
        let runtime = Runtime::without_knowledge(offline_config()).unwrap();
        assert!(runtime.assistant.knowledge().is_empty().await);

        let status = runtime
            .assistant
            .manage_credential("alice", CredentialAction::Status)
            .await
            .unwrap();
        assert!(matches!(status, CredentialActionResult::Status(s) if !s.has_credential));
    }

    #[test]
    fn missing_master_key_is_reported() {
        let mut config = offline_config();
        config.vault.master_key = None;
        let err = Runtime::without_knowledge(config).err().unwrap();
        assert!(err.to_string().contains("master key"));
    }
}
