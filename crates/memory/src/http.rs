//! HTTP backend for an agent memory server.
//!
//! Working memory (the chat window of one session) lives under
//! `/v1/working-memory/{session}`; long-term memories are written to and
//! searched in `/v1/long-term-memory`. Every request is bounded by the
//! configured timeout and surfaces as [`MemoryError::Timeout`] when it
//! expires.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use vocalis_core::error::MemoryError;
use vocalis_core::memory::{MemoryBackend, MemoryRecord, Namespace, SearchHit, SearchRequest};
use vocalis_core::message::{Message, MessageToolCall, Role};

/// Client for the agent memory server REST API.
pub struct HttpMemoryBackend {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpMemoryBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MemoryError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MemoryError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// `/v1/working-memory/{id}`, with the id percent-encoded as one segment.
    fn working_memory_url(&self, session_id: &str) -> Result<reqwest::Url, MemoryError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| MemoryError::Unavailable(format!("Invalid memory server URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| MemoryError::Unavailable(format!("Memory server URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["v1", "working-memory", session_id]);
        Ok(url)
    }

    /// Run one request future under the backend timeout.
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, MemoryError>
    where
        F: Future<Output = Result<T, MemoryError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Memory server request timed out");
                Err(MemoryError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

fn network(e: reqwest::Error) -> MemoryError {
    MemoryError::Unavailable(e.to_string())
}

async fn protocol_error(response: reqwest::Response) -> MemoryError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    warn!(status, body = %message, "Memory server returned error");
    MemoryError::Protocol { status, message }
}

#[async_trait]
impl MemoryBackend for HttpMemoryBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn get(&self, session_id: &str) -> Result<Vec<Message>, MemoryError> {
        let url = self.working_memory_url(session_id)?;
        self.bounded("get", async {
            let response = self.client.get(url.clone()).send().await.map_err(network)?;
            let status = response.status().as_u16();

            if status == 404 {
                debug!(session = %session_id, "No working memory yet");
                return Ok(Vec::new());
            }
            if status != 200 {
                return Err(protocol_error(response).await);
            }

            let body: WorkingMemory = response.json().await.map_err(|e| MemoryError::Protocol {
                status,
                message: format!("Failed to parse working memory: {e}"),
            })?;

            Ok(body.messages.into_iter().filter_map(WireMessage::into_message).collect())
        })
        .await
    }

    async fn put(&self, session_id: &str, messages: &[Message]) -> Result<(), MemoryError> {
        let url = self.working_memory_url(session_id)?;
        let body = WorkingMemory {
            session_id: Some(session_id.to_string()),
            messages: messages.iter().map(WireMessage::from).collect(),
        };

        self.bounded("put", async {
            let response = self.client.put(url.clone()).json(&body).send().await.map_err(network)?;
            if !response.status().is_success() {
                return Err(protocol_error(response).await);
            }
            debug!(session = %session_id, count = messages.len(), "Working memory persisted");
            Ok(())
        })
        .await
    }

    async fn delete(&self, session_id: &str) -> Result<(), MemoryError> {
        let url = self.working_memory_url(session_id)?;
        self.bounded("delete", async {
            let response = self.client.delete(url.clone()).send().await.map_err(network)?;
            let status = response.status().as_u16();
            if response.status().is_success() || status == 404 {
                Ok(())
            } else {
                Err(protocol_error(response).await)
            }
        })
        .await
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>, MemoryError> {
        let url = format!("{}/v1/long-term-memory/search?optimize_query=false", self.base_url);
        let body = SearchBody::from(&request);

        self.bounded("search", async {
            let response = self.client.post(&url).json(&body).send().await.map_err(network)?;
            let status = response.status().as_u16();
            if status != 200 {
                return Err(protocol_error(response).await);
            }

            let parsed: SearchResponse = response.json().await.map_err(|e| MemoryError::QueryFailed(format!(
                "Failed to parse search response: {e}"
            )))?;

            debug!(
                namespace = %request.namespace,
                hits = parsed.memories.len(),
                "Long-term memory search completed"
            );

            Ok(parsed
                .memories
                .into_iter()
                .map(|m| SearchHit {
                    id: m.id,
                    text: m.text,
                    score: m.dist.map(|d| (1.0 - d).clamp(0.0, 1.0)),
                })
                .collect())
        })
        .await
    }

    async fn store(&self, record: MemoryRecord) -> Result<String, MemoryError> {
        let url = format!("{}/v1/long-term-memory/", self.base_url);
        let id = if record.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            record.id.clone()
        };

        let body = StoreBody {
            memories: vec![WireRecord {
                id: id.clone(),
                session_id: record.session_id.clone(),
                user_id: match &record.namespace {
                    Namespace::UserMemories(user) | Namespace::Users(user) => Some(user.clone()),
                    Namespace::Session(_) | Namespace::Knowledge => None,
                },
                namespace: record.namespace.label(),
                text: record.text.clone(),
                memory_type: "semantic",
            }],
        };

        self.bounded("store", async {
            let response = self.client.post(&url).json(&body).send().await.map_err(network)?;
            if !response.status().is_success() {
                return Err(protocol_error(response).await);
            }

            let ack: StoreAck = response.json().await.unwrap_or_default();
            if ack.status.as_deref().is_some_and(|s| s != "ok") {
                return Err(MemoryError::QueryFailed(format!(
                    "Memory server did not acknowledge record {id}"
                )));
            }
            Ok(id.clone())
        })
        .await
    }

    async fn forget(&self, id: &str) -> Result<bool, MemoryError> {
        let url = format!("{}/v1/long-term-memory", self.base_url);
        self.bounded("forget", async {
            let response = self
                .client
                .delete(&url)
                .query(&[("memory_ids", id)])
                .send()
                .await
                .map_err(network)?;

            match response.status().as_u16() {
                200 | 204 => Ok(true),
                404 => Ok(false),
                _ => Err(protocol_error(response).await),
            }
        })
        .await
    }
}

// --- Memory server wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct WorkingMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<MessageToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            tool_calls: m.tool_calls.clone(),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

impl WireMessage {
    fn into_message(self) -> Option<Message> {
        let role = match self.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" | "tool_result" => Role::ToolResult,
            other => {
                warn!(role = other, "Skipping stored message with unknown role");
                return None;
            }
        };
        Some(Message {
            role,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: self.tool_call_id,
        })
    }
}

#[derive(Debug, Serialize)]
struct EqFilter<'a> {
    eq: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    /// Profile records are keyed by their user id
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<EqFilter<'a>>,
    namespace: EqFilter<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<EqFilter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<EqFilter<'a>>,
    text: &'a str,
    limit: usize,
    recent_boost: bool,
}

impl<'a> From<&'a SearchRequest> for SearchBody<'a> {
    fn from(req: &'a SearchRequest) -> Self {
        let (user_id, session_id) = match &req.namespace {
            Namespace::UserMemories(user) | Namespace::Users(user) => (Some(EqFilter { eq: user }), None),
            Namespace::Session(session) => (None, Some(EqFilter { eq: session })),
            Namespace::Knowledge => (None, None),
        };
        let id = match &req.namespace {
            Namespace::Users(user) => Some(EqFilter { eq: user }),
            _ => None,
        };
        Self {
            id,
            namespace: EqFilter { eq: req.namespace.label() },
            user_id,
            session_id,
            text: &req.text,
            limit: req.limit,
            recent_boost: req.recency_boost,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    memories: Vec<SearchedMemory>,
}

#[derive(Debug, Deserialize)]
struct SearchedMemory {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    dist: Option<f32>,
}

#[derive(Debug, Serialize)]
struct StoreBody {
    memories: Vec<WireRecord>,
}

#[derive(Debug, Serialize)]
struct WireRecord {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    namespace: &'static str,
    text: String,
    memory_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct StoreAck {
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeServer {
        sessions: HashMap<String, Value>,
        last_search: Option<Value>,
        stored: Vec<Value>,
        deleted: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeServer>>;

    async fn get_wm(State(s): State<Shared>, Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
        s.lock().unwrap().sessions.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
    }

    async fn put_wm(State(s): State<Shared>, Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
        s.lock().unwrap().sessions.insert(id, body.clone());
        Json(body)
    }

    async fn delete_wm(State(s): State<Shared>, Path(id): Path<String>) -> StatusCode {
        s.lock().unwrap().sessions.remove(&id);
        StatusCode::OK
    }

    async fn search(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        s.lock().unwrap().last_search = Some(body);
        Json(json!({"memories": [
            {"id": "m1", "text": "Memory from 2026-01-01T10:00:00: likes tea", "dist": 0.25},
            {"id": "m2", "text": "Memory from 2026-01-02T10:00:00: has a cat"}
        ]}))
    }

    async fn store(State(s): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        s.lock().unwrap().stored.push(body);
        Json(json!({"status": "ok"}))
    }

    async fn forget(State(s): State<Shared>, Query(q): Query<HashMap<String, String>>) -> StatusCode {
        match q.get("memory_ids") {
            Some(id) if id != "missing" => {
                s.lock().unwrap().deleted.push(id.clone());
                StatusCode::OK
            }
            _ => StatusCode::NOT_FOUND,
        }
    }

    async fn spawn_server() -> (String, Shared) {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/v1/working-memory/{id}", get(get_wm).put(put_wm).delete(delete_wm))
            .route("/v1/long-term-memory/search", post(search))
            .route("/v1/long-term-memory/", post(store))
            .route("/v1/long-term-memory", delete(forget))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    fn backend(url: &str) -> HttpMemoryBackend {
        HttpMemoryBackend::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let (url, _) = spawn_server().await;
        let messages = backend(&url).get("nobody").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn session_id_is_one_path_segment() {
        let (url, state) = spawn_server().await;
        let mem = backend(&url);
        mem.put("alexa/amzn1?x=1#frag", &[Message::user("hi")]).await.unwrap();

        let server = state.lock().unwrap();
        assert_eq!(server.sessions.len(), 1);
        assert!(server.sessions.contains_key("alexa/amzn1?x=1#frag"));
        drop(server);

        assert_eq!(mem.get("alexa/amzn1?x=1#frag").await.unwrap().len(), 1);
        assert!(mem.get("alexa").await.unwrap().is_empty());
    }

    #[test]
    fn working_memory_url_encodes_reserved_characters() {
        let mem = backend("http://localhost:8000/");
        let url = mem.working_memory_url("a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/working-memory/a%2Fb%3Fc%23d");
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_roles() {
        let (url, state) = spawn_server().await;
        let mem = backend(&url);
        let history = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant_tool_calls("", vec![MessageToolCall::new("c1", "clock", "{}")]),
            Message::tool_result("c1", "12:00"),
            Message::assistant("It is noon."),
        ];

        mem.put("s1", &history).await.unwrap();
        assert_eq!(mem.get("s1").await.unwrap(), history);

        let stored = state.lock().unwrap().sessions.get("s1").cloned().unwrap();
        assert_eq!(stored["messages"][3]["role"], "tool");
        assert_eq!(stored["session_id"], "s1");

        mem.delete("s1").await.unwrap();
        assert!(mem.get("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_maps_distance_to_score() {
        let (url, state) = spawn_server().await;
        let hits = backend(&url)
            .search(SearchRequest::new(Namespace::UserMemories("u1".into()), "tea", 10).with_recency_boost(true))
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id.as_deref(), Some("m1"));
        assert_eq!(hits[0].score, Some(0.75));
        assert_eq!(hits[1].score, None);

        let body = state.lock().unwrap().last_search.clone().unwrap();
        assert_eq!(body["namespace"]["eq"], "memories");
        assert_eq!(body["user_id"]["eq"], "u1");
        assert_eq!(body["recent_boost"], true);
        assert_eq!(body["limit"], 10);
    }

    #[tokio::test]
    async fn knowledge_search_has_no_user_filter() {
        let (url, state) = spawn_server().await;
        backend(&url)
            .search(SearchRequest::new(Namespace::Knowledge, "capital", 1))
            .await
            .unwrap();
        let body = state.lock().unwrap().last_search.clone().unwrap();
        assert_eq!(body["namespace"]["eq"], "knowledge");
        assert!(body.get("user_id").is_none());
    }

    #[tokio::test]
    async fn profile_lookup_filters_by_id() {
        let (url, state) = spawn_server().await;
        backend(&url)
            .search(SearchRequest::new(Namespace::Users("u1".into()), "", 1))
            .await
            .unwrap();
        let body = state.lock().unwrap().last_search.clone().unwrap();
        assert_eq!(body["namespace"]["eq"], "users");
        assert_eq!(body["id"]["eq"], "u1");
        assert_eq!(body["user_id"]["eq"], "u1");
        assert_eq!(body["limit"], 1);
    }

    #[tokio::test]
    async fn store_sends_semantic_record() {
        let (url, state) = spawn_server().await;
        let id = backend(&url)
            .store(MemoryRecord {
                id: String::new(),
                namespace: Namespace::UserMemories("u1".into()),
                text: "likes tea".into(),
                session_id: Some("s1".into()),
            })
            .await
            .unwrap();
        assert!(!id.is_empty());

        let body = state.lock().unwrap().stored[0].clone();
        let record = &body["memories"][0];
        assert_eq!(record["id"], id.as_str());
        assert_eq!(record["namespace"], "memories");
        assert_eq!(record["user_id"], "u1");
        assert_eq!(record["memory_type"], "semantic");
    }

    #[tokio::test]
    async fn forget_reports_missing_ids() {
        let (url, state) = spawn_server().await;
        let mem = backend(&url);
        assert!(mem.forget("m1").await.unwrap());
        assert!(!mem.forget("missing").await.unwrap());
        assert_eq!(state.lock().unwrap().deleted, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let mem = HttpMemoryBackend::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = mem.get("s1").await.unwrap_err();
        assert!(matches!(err, MemoryError::Unavailable(_) | MemoryError::Timeout { .. }));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let app = Router::new().route(
            "/v1/working-memory/{id}",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"messages": []}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mem = HttpMemoryBackend::new(format!("http://{addr}"), Duration::from_millis(100)).unwrap();
        let err = mem.get("s1").await.unwrap_err();
        assert!(matches!(err, MemoryError::Timeout { timeout_ms: 100, .. }));
    }
}
