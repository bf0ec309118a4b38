//! Retrieval-augmented prompt assembly.
//!
//! The system prompt is four sections in fixed order: the assistant preamble,
//! the retrieved documents, the conversation so far, and the visitor's
//! question verbatim.

use persona_core::error::KnowledgeError;
use persona_core::message::Message;
use persona_memory::{KnowledgeStore, SearchHit};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SEARCH_LIMIT: usize = 3;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub struct PromptBuilder {
    knowledge: Arc<KnowledgeStore>,
    preamble: String,
    search_limit: usize,
    history_limit: usize,
}

impl PromptBuilder {
    pub fn new(knowledge: Arc<KnowledgeStore>, preamble: impl Into<String>) -> Self {
        Self {
            knowledge,
            preamble: preamble.into(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Only the most recent `limit` history messages are rendered.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }

    /// Search the knowledge store for `query` and assemble the system prompt.
    pub async fn build_prompt(&self, query: &str, history: &[Message]) -> Result<String, KnowledgeError> {
        let hits = self.knowledge.search(query, self.search_limit).await?;
        debug!(hits = hits.len(), history = history.len(), "Building prompt");
        Ok(self.render(query, &hits, history))
    }

    /// Pure rendering step, separated from retrieval.
    pub fn render(&self, query: &str, hits: &[SearchHit], history: &[Message]) -> String {
        let documents = if hits.is_empty() {
            "No relevant documents found.".to_string()
        } else {
            hits.iter().map(render_hit).collect::<Vec<_>>().join("\n\n")
        };

        let start = history.len().saturating_sub(self.history_limit);
        let conversation = if history[start..].is_empty() {
            "No previous messages.".to_string()
        } else {
            history[start..]
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "{preamble}\n\n\
             Relevant information:\n{documents}\n\n\
             Conversation history:\n{conversation}\n\n\
             Current question: {query}",
            preamble = self.preamble.trim_end(),
        )
    }
}

fn render_hit(hit: &SearchHit) -> String {
    format!(
        "Document: {}\nContent: {}\nRelevance: {:.1}%",
        hit.title,
        hit.content,
        hit.similarity * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::KeywordEmbedder;
    use persona_memory::NewDocument;

    fn hit(title: &str, content: &str, similarity: f32) -> SearchHit {
        SearchHit {
            id: title.to_lowercase(),
            title: title.into(),
            content: content.into(),
            tags: vec![],
            similarity,
        }
    }

    fn builder() -> PromptBuilder {
        let knowledge = Arc::new(KnowledgeStore::new(Arc::new(KeywordEmbedder)));
        PromptBuilder::new(knowledge, "You are the site assistant.")
    }

    #[test]
    fn renders_sections_in_order() {
        let prompt = builder().render(
            "What is MCP?",
            &[hit("Agents", "MCP connects tools", 0.8734)],
            &[Message::user("hi"), Message::assistant("hello!")],
        );

        let preamble = prompt.find("You are the site assistant.").unwrap();
        let doc = prompt.find("Document: Agents\nContent: MCP connects tools\nRelevance: 87.3%").unwrap();
        let history = prompt.find("user: hi\nassistant: hello!").unwrap();
        let question = prompt.find("Current question: What is MCP?").unwrap();
        assert!(preamble < doc && doc < history && history < question);
        assert!(prompt.ends_with("What is MCP?"));
    }

    #[test]
    fn documents_joined_by_blank_line() {
        let prompt = builder().render(
            "q",
            &[hit("A", "alpha", 1.0), hit("B", "beta", 0.5)],
            &[],
        );
        assert!(prompt.contains("Relevance: 100.0%\n\nDocument: B"));
        assert!(prompt.contains("Relevance: 50.0%"));
        assert!(prompt.contains("No previous messages."));
    }

    #[test]
    fn empty_results_are_stated() {
        let prompt = builder().render("q", &[], &[]);
        assert!(prompt.contains("No relevant documents found."));
    }

    #[test]
    fn history_is_truncated_to_most_recent() {
        let history: Vec<_> = (0..5).map(|i| Message::user(format!("m{i}"))).collect();
        let prompt = builder().with_history_limit(2).render("q", &[], &history);
        assert!(!prompt.contains("user: m2"));
        assert!(prompt.contains("user: m3\nuser: m4"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let b = builder();
        let hits = [hit("A", "alpha", 0.25)];
        let history = [Message::user("x")];
        assert_eq!(b.render("q", &hits, &history), b.render("q", &hits, &history));
    }

    #[tokio::test]
    async fn build_prompt_uses_search_limit() {
        let knowledge = Arc::new(KnowledgeStore::new(Arc::new(KeywordEmbedder)));
        for (id, content) in [("a", "rust"), ("b", "rust agent"), ("c", "mcp")] {
            knowledge
                .add_document(NewDocument::new(id, id.to_uppercase(), content))
                .await
                .unwrap();
        }
        let builder = PromptBuilder::new(knowledge, "Preamble").with_search_limit(2);

        let prompt = builder.build_prompt("rust", &[]).await.unwrap();
        assert_eq!(prompt.matches("Document: ").count(), 2);
        assert!(prompt.find("Document: A").unwrap() < prompt.find("Document: B").unwrap());
        assert!(!prompt.contains("Document: C"));
    }
}
