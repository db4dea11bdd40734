//! Shared test doubles for engine tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use vocalis_core::error::{EstimationError, MemoryError, ProviderError};
use vocalis_core::memory::{MemoryBackend, MemoryRecord, SearchHit, SearchRequest};
use vocalis_core::message::{Message, MessageToolCall};
use vocalis_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

use crate::context::TokenEstimator;
use crate::retrieval::{RetrievalSource, RetrievedItem};

/// One scripted model turn: text, or a batch of tool calls.
pub enum Scripted {
    Text(String),
    ToolCalls(Vec<MessageToolCall>),
}

/// A provider that returns a sequence of scripted replies and records every
/// request it receives.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedProvider {
    replies: Mutex<Vec<Result<Scripted, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::with_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self::scripted(replies.into_iter().map(|r| r.map(Scripted::Text)).collect())
    }

    pub fn scripted(replies: Vec<Result<Scripted, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            panic!("ScriptedProvider: no more replies (call #{call})");
        }
        let (content, tool_calls) = match replies.remove(0)? {
            Scripted::Text(content) => (content, Vec::new()),
            Scripted::ToolCalls(calls) => (String::new(), calls),
        };
        Ok(ProviderResponse {
            content,
            model: request.model,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            tool_calls,
        })
    }
}

/// A backend where every call fails.
pub struct FailingBackend;

#[async_trait]
impl MemoryBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _session_id: &str) -> Result<Vec<Message>, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn put(&self, _session_id: &str, _messages: &[Message]) -> Result<(), MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _session_id: &str) -> Result<(), MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn search(&self, _request: SearchRequest) -> Result<Vec<SearchHit>, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn store(&self, _record: MemoryRecord) -> Result<String, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }

    async fn forget(&self, _id: &str) -> Result<bool, MemoryError> {
        Err(MemoryError::Unavailable("connection refused".into()))
    }
}

/// A backend that never answers.
pub struct StalledBackend;

async fn stall<T>() -> T {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    unreachable!("stalled call outlived its test")
}

#[async_trait]
impl MemoryBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn get(&self, _session_id: &str) -> Result<Vec<Message>, MemoryError> {
        stall().await
    }

    async fn put(&self, _session_id: &str, _messages: &[Message]) -> Result<(), MemoryError> {
        stall().await
    }

    async fn delete(&self, _session_id: &str) -> Result<(), MemoryError> {
        stall().await
    }

    async fn search(&self, _request: SearchRequest) -> Result<Vec<SearchHit>, MemoryError> {
        stall().await
    }

    async fn store(&self, _record: MemoryRecord) -> Result<String, MemoryError> {
        stall().await
    }

    async fn forget(&self, _id: &str) -> Result<bool, MemoryError> {
        stall().await
    }
}

/// An estimator that always fails.
pub struct FailingEstimator;

impl TokenEstimator for FailingEstimator {
    fn estimate(&self, _messages: &[Message]) -> Result<usize, EstimationError> {
        Err(EstimationError::Failed("tokenizer offline".into()))
    }
}

/// A retrieval source with canned items and an optional delay.
pub struct StaticSource {
    pub name: String,
    pub items: Vec<RetrievedItem>,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl StaticSource {
    pub fn new(name: &str, texts: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            items: texts.iter().map(|t| RetrievedItem::new(*t)).collect(),
            delay: None,
            fail: false,
        }
    }

    pub fn scored(name: &str, items: &[(&str, f32)]) -> Self {
        Self {
            items: items
                .iter()
                .map(|(t, s)| RetrievedItem::scored(*t, *s))
                .collect(),
            ..Self::new(name, &[])
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, &[])
        }
    }
}

#[async_trait]
impl RetrievalSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "canned test items"
    }

    async fn query(&self, _text: &str) -> vocalis_core::Result<Vec<RetrievedItem>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(MemoryError::QueryFailed(format!("{} is down", self.name)).into());
        }
        Ok(self.items.clone())
    }
}
