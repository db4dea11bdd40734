//! In-memory backend — useful for testing, dry runs and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;
use vocalis_core::error::MemoryError;
use vocalis_core::memory::{MemoryBackend, MemoryRecord, Namespace, SearchHit, SearchRequest};
use vocalis_core::message::Message;

/// An in-memory backend that keeps sessions in a map and records in a Vec.
///
/// Search is keyword based: the score is the fraction of query words that
/// occur in the record text.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
    records: Arc<RwLock<Vec<MemoryRecord>>>,
    puts: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stored in one namespace, oldest first.
    pub async fn records(&self, namespace: &Namespace) -> Vec<MemoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| &r.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

fn keyword_score(text: &str, words: &[String]) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let matched = words.iter().filter(|w| text.contains(w.as_str())).count();
    matched as f32 / words.len() as f32
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        Ok(self.sessions.read().await.get(session_id).cloned().unwrap_or_default())
    }

    async fn put(&self, session_id: &str, messages: &[Message]) -> Result<(), MemoryError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), MemoryError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, MemoryError> {
        let words: Vec<String> = request
            .text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(str::to_lowercase)
            .collect();

        let records = self.records.read().await;
        let candidates: Box<dyn Iterator<Item = &MemoryRecord>> = if request.recency_boost {
            Box::new(records.iter().rev())
        } else {
            Box::new(records.iter())
        };

        // A blank query lists the namespace
        let list_all = request.text.trim().is_empty();
        let mut hits: Vec<SearchHit> = candidates
            .filter(|r| r.namespace == request.namespace)
            .map(|r| SearchHit {
                id: Some(r.id.clone()),
                text: r.text.clone(),
                score: Some(if list_all { 1.0 } else { keyword_score(&r.text, &words) }),
            })
            .filter(|h| h.score.is_some_and(|s| s > 0.0))
            .collect();

        // Stable: equal scores keep insertion (or recency) order
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn store(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        let mut records = self.records.write().await;
        records.retain(|r| r.id != id);
        records.push(record);
        Ok(id)
    }

    async fn forget(&self, id: &str) -> Result<bool, MemoryError> {
        let mut records = self.records.write().await;
        let len_before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < len_before)
    }
}
