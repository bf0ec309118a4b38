//! # Persona Core
//!
//! Domain types, traits, and error definitions for the Persona assistant
//! orchestration core. This crate has **no framework dependencies**; it
//! defines the model every other crate implements against.
//!
//! Every collaborator the core consumes (chat completion, model listing,
//! embedding) is a trait here, so implementations can be swapped by
//! configuration and replaced with mocks in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod embedding;

// Re-export key types at crate root for ergonomics
pub use error::{KnowledgeError, ProviderError, VaultError};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{
    Provider, ProviderFactory, ProviderRequest, ProviderResponse, StreamChunk, TokenReceiver,
    Usage,
};
pub use embedding::Embedder;
