//! Memory backend trait — session history plus namespaced semantic search.
//!
//! The backend stores two kinds of data:
//! - **Working memory**: the ordered message list of one session
//!   (`get` / `put` / `delete`).
//! - **Long-term memory**: free-text records partitioned by [`Namespace`],
//!   retrievable by semantic search.
//!
//! Implementations are assumed network-backed, fallible, and idempotent on
//! retry. Writes are last-write-wins; no locking is offered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::Message;

/// A logical partition of the backend's storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "owner", rename_all = "snake_case")]
pub enum Namespace {
    /// Chat history of one session.
    Session(String),
    /// Long-term memories a user explicitly asked to keep.
    UserMemories(String),
    /// The profile record of one user (their name).
    Users(String),
    /// Global, not user-specific, knowledge facts.
    Knowledge,
}

impl Namespace {
    /// The namespace label understood by the memory server.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Session(_) => "session",
            Self::UserMemories(_) => "memories",
            Self::Users(_) => "users",
            Self::Knowledge => "knowledge",
        }
    }

    /// The owning session or user id, if the namespace is scoped.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Session(id) | Self::UserMemories(id) | Self::Users(id) => Some(id),
            Self::Knowledge => None,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner() {
            Some(owner) => write!(f, "{}:{}", self.label(), owner),
            None => f.write_str(self.label()),
        }
    }
}

/// A semantic search against one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub namespace: Namespace,

    /// The search text
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Prefer more recently stored records
    #[serde(default)]
    pub recency_boost: bool,
}

fn default_limit() -> usize {
    10
}

impl SearchRequest {
    pub fn new(namespace: Namespace, text: impl Into<String>, limit: usize) -> Self {
        Self {
            namespace,
            text: text.into(),
            limit,
            recency_boost: false,
        }
    }

    pub fn with_recency_boost(mut self, boost: bool) -> Self {
        self.recency_boost = boost;
        self
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Backend id of the record, when the backend exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub text: String,

    /// Relevance in [0, 1], higher is better; `None` if the backend gives no score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// A long-term record to store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Record id; backends generate one when empty
    #[serde(default)]
    pub id: String,

    pub namespace: Namespace,

    pub text: String,

    /// Session the record originated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// The core MemoryBackend trait.
///
/// Implementations: HTTP memory server, in-memory (for testing), none (no-op).
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "http", "in_memory", "none").
    fn name(&self) -> &str;

    /// Load the ordered messages of a session. Unknown sessions are empty.
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, MemoryError>;

    /// Replace the stored messages of a session.
    async fn put(&self, session_id: &str, messages: &[Message]) -> Result<(), MemoryError>;

    /// Delete all stored messages of a session.
    async fn delete(&self, session_id: &str) -> Result<(), MemoryError>;

    /// Semantic search in one namespace.
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, MemoryError>;

    /// Store a long-term record, returning its id.
    async fn store(&self, record: MemoryRecord) -> Result<String, MemoryError>;

    /// Delete a long-term record by id. Returns whether something was removed.
    async fn forget(&self, id: &str) -> Result<bool, MemoryError>;
}
