//! Per-conversation chat history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::llm::ChatMessage;

#[derive(Debug, Error)]
pub enum ConversationStoreError {
    #[error("conversation `{0}` was not found")]
    NotFound(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// A fresh id not currently in use.
    async fn next_id(&self) -> String;
    /// Creates an empty history unless one already exists.
    async fn create(&self, id: &str) -> Result<(), ConversationStoreError>;
    async fn get(&self, id: &str) -> Result<Option<Vec<ChatMessage>>, ConversationStoreError>;
    /// Appends all messages under a single write.
    async fn append(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), ConversationStoreError>;
}

/// Process-local store. Histories grow without bound and are lost on restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<ChatMessage>>>,
    sequence: AtomicU64,
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn next_id(&self) -> String {
        let conversations = self.conversations.read().await;
        loop {
            let candidate = format!("conv_{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
            if !conversations.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    async fn create(&self, id: &str) -> Result<(), ConversationStoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(id.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<ChatMessage>>, ConversationStoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(id).cloned())
    }

    async fn append(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), ConversationStoreError> {
        let mut conversations = self.conversations.write().await;
        let history = conversations
            .get_mut(id)
            .ok_or_else(|| ConversationStoreError::NotFound(id.to_string()))?;
        history.extend(messages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ConversationStore, ConversationStoreError, InMemoryConversationStore};
    use crate::llm::{ChatMessage, ChatRole};

    #[tokio::test]
    async fn ids_are_sequential_and_skip_existing() {
        let store = InMemoryConversationStore::default();
        store.create("conv_2").await.expect("create");

        assert_eq!(store.next_id().await, "conv_1");
        assert_eq!(store.next_id().await, "conv_3");
    }

    #[tokio::test]
    async fn create_is_idempotent_and_append_accumulates() {
        let store = InMemoryConversationStore::default();
        store.create("sales").await.expect("create");
        store
            .append("sales", vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")])
            .await
            .expect("append");
        store.create("sales").await.expect("second create keeps history");
        store.append("sales", vec![ChatMessage::user("again")]).await.expect("append");

        let history = store.get("sales").await.expect("get").expect("history");
        let roles = history.iter().map(|message| message.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]);
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_fails() {
        let store = InMemoryConversationStore::default();

        let error = store.append("missing", vec![ChatMessage::user("hi")]).await.expect_err("missing");

        assert!(matches!(error, ConversationStoreError::NotFound(id) if id == "missing"));
        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn concurrent_turns_append_whole_pairs() {
        let store = Arc::new(InMemoryConversationStore::default());
        store.create("shared").await.expect("create");

        let handles = (0..8)
            .map(|turn| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append("shared", vec![
                            ChatMessage::user(format!("q{turn}")),
                            ChatMessage::assistant(format!("a{turn}")),
                        ])
                        .await
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.expect("join").expect("append");
        }

        let history = store.get("shared").await.expect("get").expect("history");
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            let question = pair[0].content.as_deref().expect("question");
            let answer = pair[1].content.as_deref().expect("answer");
            assert_eq!(&question[1..], &answer[1..]);
        }
    }
}
