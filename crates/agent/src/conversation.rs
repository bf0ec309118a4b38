//! Process-lifetime conversation history.
//!
//! Bounded two ways: each conversation keeps at most `history_limit`
//! messages, and the cache holds at most `max_conversations` entries,
//! evicting the least recently touched one.

use persona_core::message::{Conversation, ConversationId, Message};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    touched: u64,
    conversation: Conversation,
}

#[derive(Default)]
struct Inner {
    clock: u64,
    entries: HashMap<ConversationId, Entry>,
}

pub struct ConversationCache {
    inner: RwLock<Inner>,
    max_conversations: usize,
    history_limit: usize,
}

impl ConversationCache {
    pub fn new(max_conversations: usize, history_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_conversations: max_conversations.max(1),
            history_limit,
        }
    }

    /// Messages recorded so far, oldest first. Unknown ids have no history.
    pub async fn history(&self, id: &ConversationId) -> Vec<Message> {
        self.inner
            .read()
            .await
            .entries
            .get(id)
            .map(|e| e.conversation.messages.clone())
            .unwrap_or_default()
    }

    /// Append messages, creating the conversation if needed.
    pub async fn record(&self, id: &ConversationId, messages: impl IntoIterator<Item = Message>) {
        let mut inner = self.inner.write().await;
        inner.clock += 1;
        let touched = inner.clock;

        if !inner.entries.contains_key(id) && inner.entries.len() >= self.max_conversations {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(conversation = %oldest, "Evicting conversation");
                inner.entries.remove(&oldest);
            }
        }

        let entry = inner.entries.entry(id.clone()).or_insert_with(|| Entry {
            touched,
            conversation: Conversation::with_id(id.clone()),
        });
        entry.touched = touched;
        for message in messages {
            entry.conversation.push(message);
        }
        entry.conversation.truncate_front(self.history_limit);
    }

    pub async fn forget(&self, id: &ConversationId) -> bool {
        self.inner.write().await.entries.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_in_order_and_truncates() {
        let cache = ConversationCache::new(10, 3);
        let id = ConversationId::from("c1");
        cache
            .record(&id, [Message::user("a"), Message::assistant("b")])
            .await;
        cache
            .record(&id, [Message::user("c"), Message::assistant("d")])
            .await;

        let history: Vec<_> = cache.history(&id).await.into_iter().map(|m| m.content).collect();
        assert_eq!(history, vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let cache = ConversationCache::new(10, 3);
        assert!(cache.history(&ConversationId::from("nope")).await.is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn evicts_least_recently_touched() {
        let cache = ConversationCache::new(2, 10);
        let (a, b, c) = (
            ConversationId::from("a"),
            ConversationId::from("b"),
            ConversationId::from("c"),
        );
        cache.record(&a, [Message::user("1")]).await;
        cache.record(&b, [Message::user("2")]).await;
        cache.record(&a, [Message::user("3")]).await;
        cache.record(&c, [Message::user("4")]).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.history(&b).await.is_empty());
        assert_eq!(cache.history(&a).await.len(), 2);
    }

    #[tokio::test]
    async fn forget_removes_conversation() {
        let cache = ConversationCache::new(2, 10);
        let id = ConversationId::from("a");
        cache.record(&id, [Message::user("1")]).await;
        assert!(cache.forget(&id).await);
        assert!(!cache.forget(&id).await);
    }
}
