//! The assistant request path for Persona.
//!
//! A chat request follows a **Retrieve → Assemble → Generate** cycle:
//!
//! 1. **Resolve** the owner's usable credential from the vault
//! 2. **Retrieve** the most relevant knowledge documents for the question
//! 3. **Assemble** the system prompt (preamble + documents + history + question)
//! 4. **Generate** through the model chain with retry, fallback and health tracking
//!
//! Failures at any step come back as a structured [`ChatOutcome`].

pub mod assistant;
pub mod conversation;
pub mod prompt;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use assistant::{
    Assistant, ChatError, ChatOptions, ChatOutcome, ChatReply, ChatStream, CredentialAction,
    CredentialActionResult,
};
pub use conversation::ConversationCache;
pub use prompt::PromptBuilder;
pub use stream_event::ChatStreamEvent;
