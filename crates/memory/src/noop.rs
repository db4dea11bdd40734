//! No-op memory backend — disables persistence and retrieval entirely.

use async_trait::async_trait;
use vocalis_core::error::MemoryError;
use vocalis_core::memory::{MemoryBackend, MemoryRecord, SearchHit, SearchRequest};
use vocalis_core::message::Message;

/// A backend that stores nothing; every session starts empty.
pub struct NoopMemory;

#[async_trait]
impl MemoryBackend for NoopMemory {
    fn name(&self) -> &str {
        "none"
    }

    async fn get(&self, _session_id: &str) -> Result<Vec<Message>, MemoryError> {
        Ok(Vec::new())
    }

    async fn put(&self, _session_id: &str, _messages: &[Message]) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn delete(&self, _session_id: &str) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn search(&self, _request: SearchRequest) -> Result<Vec<SearchHit>, MemoryError> {
        Ok(Vec::new())
    }

    async fn store(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        Ok(record.id)
    }

    async fn forget(&self, _id: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forgets_everything() {
        let mem = NoopMemory;
        mem.put("s1", &[Message::user("hi")]).await.unwrap();
        assert!(mem.get("s1").await.unwrap().is_empty());
        assert!(!mem.forget("x").await.unwrap());
    }
}
