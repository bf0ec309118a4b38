//! Upstream AI provider integration and resilient generation for Persona.

pub mod classifier;
pub mod embedder;
pub mod openai_compat;
pub mod orchestrator;

pub use classifier::{ErrorClassifier, FailureClass};
pub use embedder::ProviderEmbedder;
pub use openai_compat::{OpenAiCompatFactory, OpenAiCompatProvider};
pub use orchestrator::{
    Generation, GenerationFailure, GenerationOptions, GenerationOrchestrator, GenerationStream,
    OrchestratorSettings,
};
