//! Chat-level streaming events.
//!
//! `ChatStreamEvent` wraps provider-level stream chunks into the events a
//! front end forwards to the visitor over SSE.

use persona_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted while a streamed reply is delivered.
///
/// - `chunk`: partial text token from the model
/// - `done`: the stream is complete
/// - `error`: the stream broke after it had opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Chunk { content: String },

    /// Final metadata. `attempt` is the retry round that opened the stream.
    Done {
        model: String,
        attempt: u32,
        usage: Option<Usage>,
    },

    Error { message: String },
}

impl ChatStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serializes_with_type_tag() {
        let event = ChatStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn done_carries_model_and_attempt() {
        let event = ChatStreamEvent::Done {
            model: "gpt-4o-mini".into(),
            attempt: 2,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""attempt":2"#));
        assert!(json.contains(r#""total_tokens":30"#));
    }

    #[test]
    fn event_types_and_terminality() {
        let chunk = ChatStreamEvent::Chunk { content: "x".into() };
        let error = ChatStreamEvent::Error { message: "boom".into() };
        assert_eq!(chunk.event_type(), "chunk");
        assert_eq!(error.event_type(), "error");
        assert!(!chunk.is_terminal());
        assert!(error.is_terminal());
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: ChatStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ChatStreamEvent::Chunk { content: "hi".into() });
    }
}
