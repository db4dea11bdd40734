//! Retrieval sources — where augmentation content comes from.
//!
//! A source is stateless from the router's point of view: a description the
//! classifier can read, and a query operation returning scored items.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use vocalis_core::Result;
use vocalis_core::memory::{MemoryBackend, Namespace, SearchRequest};
use vocalis_core::message::{Message, Role};

/// One item returned by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedItem {
    pub text: String,
    /// Relevance in [0, 1] when the source scores its results
    pub score: Option<f32>,
}

impl RetrievedItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
        }
    }

    pub fn scored(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score: Some(score),
        }
    }
}

/// An item tagged with the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedContent {
    pub text: String,
    pub source_name: String,
    pub score: Option<f32>,
}

impl AggregatedContent {
    pub fn from_item(source_name: &str, item: RetrievedItem) -> Self {
        Self {
            text: item.text,
            source_name: source_name.to_string(),
            score: item.score,
        }
    }
}

#[async_trait]
pub trait RetrievalSource: Send + Sync {
    /// Short identifier used in logs and aggregated content.
    fn name(&self) -> &str;

    /// Natural-language description the classifier routes on.
    fn description(&self) -> &str;

    async fn query(&self, text: &str) -> Result<Vec<RetrievedItem>>;
}

// ── Chat history ─────────────────────────────────────────────────────────

/// The current session's messages, as a snapshot taken when the turn starts.
pub struct ChatHistorySource {
    texts: Vec<String>,
}

impl ChatHistorySource {
    pub fn new(messages: &[Message]) -> Self {
        Self {
            texts: messages
                .iter()
                .filter(|m| m.role != Role::ToolResult && !m.content.trim().is_empty())
                .map(|m| m.content.clone())
                .collect(),
        }
    }
}

#[async_trait]
impl RetrievalSource for ChatHistorySource {
    fn name(&self) -> &str {
        "chat_history"
    }

    fn description(&self) -> &str {
        "user specific short-term memories from recent conversations"
    }

    async fn query(&self, _text: &str) -> Result<Vec<RetrievedItem>> {
        Ok(self.texts.iter().cloned().map(RetrievedItem::new).collect())
    }
}

// ── User memories ────────────────────────────────────────────────────────

/// Long-term memories the user explicitly asked to keep.
pub struct UserMemorySource {
    backend: Arc<dyn MemoryBackend>,
    user_id: String,
    limit: usize,
    recency_boost: bool,
}

impl UserMemorySource {
    pub fn new(backend: Arc<dyn MemoryBackend>, user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
            limit,
            recency_boost: true,
        }
    }

    pub fn with_recency_boost(mut self, boost: bool) -> Self {
        self.recency_boost = boost;
        self
    }
}

#[async_trait]
impl RetrievalSource for UserMemorySource {
    fn name(&self) -> &str {
        "user_memories"
    }

    fn description(&self) -> &str {
        "user specific long-term memories, personal preferences and data"
    }

    async fn query(&self, text: &str) -> Result<Vec<RetrievedItem>> {
        let request = SearchRequest::new(Namespace::UserMemories(self.user_id.clone()), text, self.limit)
            .with_recency_boost(self.recency_boost);
        let hits = self.backend.search(request).await?;
        debug!(user = %self.user_id, hits = hits.len(), "User memory search");
        Ok(hits
            .into_iter()
            .map(|h| RetrievedItem {
                text: h.text,
                score: h.score,
            })
            .collect())
    }
}

// ── Knowledge base ───────────────────────────────────────────────────────

/// Global facts, not tied to any user.
pub struct KnowledgeBaseSource {
    backend: Arc<dyn MemoryBackend>,
    limit: usize,
}

impl KnowledgeBaseSource {
    pub fn new(backend: Arc<dyn MemoryBackend>, limit: usize) -> Self {
        Self { backend, limit }
    }
}

#[async_trait]
impl RetrievalSource for KnowledgeBaseSource {
    fn name(&self) -> &str {
        "knowledge_base"
    }

    fn description(&self) -> &str {
        "not user specific general knowledge base with facts and data"
    }

    async fn query(&self, text: &str) -> Result<Vec<RetrievedItem>> {
        let hits = self
            .backend
            .search(SearchRequest::new(Namespace::Knowledge, text, self.limit))
            .await?;
        Ok(hits
            .into_iter()
            .map(|h| RetrievedItem {
                text: h.text,
                score: h.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocalis_core::memory::MemoryRecord;
    use vocalis_memory::InMemoryBackend;

    async fn seeded() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        for (ns, text) in [
            (Namespace::UserMemories("u1".into()), "Memory from 2026-01-01T10:00:00: my car is parked on level 3"),
            (Namespace::UserMemories("u2".into()), "Memory from 2026-01-01T10:00:00: my car is blue"),
            (Namespace::Knowledge, "Fact from 2026-01-01T10:00:00Z, the cafeteria opens at 8"),
        ] {
            backend
                .store(MemoryRecord {
                    id: String::new(),
                    namespace: ns,
                    text: text.into(),
                    session_id: None,
                })
                .await
                .unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn chat_history_skips_blank_messages() {
        let source = ChatHistorySource::new(&[
            Message::user("Query: hello"),
            Message::assistant(""),
            Message::assistant("Good day."),
            Message::tool_result("c1", "2026-01-05"),
        ]);
        let items = source.query("anything").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text, "Good day.");
        assert!(items.iter().all(|i| i.score.is_none()));
    }

    #[tokio::test]
    async fn user_memories_are_scoped_to_user() {
        let backend = seeded().await;
        let source = UserMemorySource::new(backend, "u1", 10);
        let items = source.query("where is my car parked").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].text.contains("level 3"));
        assert!(items[0].score.is_some());
    }

    #[tokio::test]
    async fn knowledge_base_searches_global_namespace() {
        let backend = seeded().await;
        let source = KnowledgeBaseSource::new(backend, 1);
        let items = source.query("when does the cafeteria open").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].text.contains("cafeteria"));
    }

    #[tokio::test]
    async fn backend_failure_is_an_error() {
        let source = KnowledgeBaseSource::new(Arc::new(crate::test_helpers::FailingBackend), 1);
        assert!(source.query("x").await.is_err());
    }
}
