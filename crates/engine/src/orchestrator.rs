//! The orchestrator — one method per user intent.
//!
//! Each turn checks the session's [`ChatWindow`] out of the cache, does its
//! work, and checks the window back in. A conversation turn may take a few
//! tool rounds before its final answer; each round's assistant call and tool
//! results are appended as they happen. The load–mutate–persist cycle is not
//! locked: two concurrent turns of one session resolve by the backend's
//! last-write-wins, and one turn's append may be lost.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vocalis_config::{AppConfig, MemoryConfig, ModelConfig, RetrievalConfig};
use vocalis_core::error::{MemoryError, ReminderError};
use vocalis_core::memory::{MemoryBackend, MemoryRecord, Namespace, SearchRequest};
use vocalis_core::message::{Message, MessageToolCall};
use vocalis_core::provider::{Provider, ProviderRequest};
use vocalis_core::session::SessionAttributes;
use vocalis_core::{Error, Result};
use vocalis_reminders::spec::SCHEDULE_FORMAT;
use vocalis_reminders::{
    ConfirmOutcome, ConfirmSettings, ConfirmationState, ReminderApi, ReminderExtraction, ReminderSpec,
};

use crate::context::{ChatWindow, HeuristicEstimator, TokenEstimator, WindowSettings};
use crate::prompts;
use crate::retrieval::{
    ChatHistorySource, KnowledgeBaseSource, LanguageModelClassifier, QueryClassifier, RetrievalAugmentor,
    RetrievalSource, UserMemorySource,
};
use crate::session_cache::SessionCache;
use crate::tools::{ToolContext, ToolRegistry};

/// Tool rounds per conversation turn; the last request offers no tools.
const MAX_TOOL_ROUNDS: usize = 4;
const MAX_NAME_CHARS: usize = 255;

const FALLBACK_REPLY: &str = "I'm having difficulty processing that request at the moment. Could you rephrase it?";
const NO_QUERY: &str = "I didn't catch what you said. Could you please repeat that?";
const NO_MEMORY: &str = "I didn't catch what you wanted me to remember.";
const STORE_FAILED: &str = "I'm sorry, I couldn't store that memory. Please try again.";
const STORED_ACK: &str = "Noted. I've stored that memory.";
const NOTHING_TO_FORGET: &str = "I didn't catch which memory you'd like me to forget. Could you please specify?";
const MEMORY_NOT_FOUND: &str =
    "I couldn't locate that specific memory. Perhaps it was phrased differently?";
const DELETION_FAILED: &str = "I encountered an issue while removing that memory. Please try again momentarily.";
const FORGOTTEN_ACK: &str = "I've removed that from my memory. It's been completely erased.";
const NO_NAME: &str = "I didn't catch your name. Could you please repeat that?";
const INTRO_FAILED: &str = "I'm having trouble saving your information at the moment. Please try again later.";

/// Who is asking, where, and when.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub time_zone: Tz,
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, time_zone: Tz) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_name: None,
            time_zone,
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Pin the request time.
    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// The request time on the user's wall clock.
    pub fn local_now(&self) -> NaiveDateTime {
        self.received_at.with_timezone(&self.time_zone).naive_local()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RememberOutcome {
    Stored { memory_id: String, speech: String },
    /// Stored, and a reminder is now awaiting a yes/no
    ReminderOffered {
        memory_id: String,
        speech: String,
        spec: ReminderSpec,
    },
    Failed { speech: String },
}

impl RememberOutcome {
    pub fn speech(&self) -> &str {
        match self {
            Self::Stored { speech, .. } | Self::ReminderOffered { speech, .. } | Self::Failed { speech } => speech,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgetOutcome {
    Forgotten { memory_id: String, speech: String },
    NotFound { speech: String },
    Failed { speech: String },
}

impl ForgetOutcome {
    pub fn speech(&self) -> &str {
        match self {
            Self::Forgotten { speech, .. } | Self::NotFound { speech } | Self::Failed { speech } => speech,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntroOutcome {
    /// A new user, now stored
    Welcomed { name: String, speech: String },
    /// Already known under `name`; nothing was stored
    Recognized { name: String, speech: String },
    Failed { speech: String },
}

impl IntroOutcome {
    pub fn speech(&self) -> &str {
        match self {
            Self::Welcomed { speech, .. } | Self::Recognized { speech, .. } | Self::Failed { speech } => speech,
        }
    }
}

/// Wires the window, retrieval, the model and reminders into turns.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    backend: Arc<dyn MemoryBackend>,
    reminders: Arc<dyn ReminderApi>,
    estimator: Arc<dyn TokenEstimator>,
    augmentor: RetrievalAugmentor,
    model: ModelConfig,
    memory: MemoryConfig,
    retrieval: RetrievalConfig,
    window_settings: WindowSettings,
    confirm_settings: ConfirmSettings,
    tools: ToolRegistry,
    windows: Mutex<SessionCache<ChatWindow>>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        backend: Arc<dyn MemoryBackend>,
        reminders: Arc<dyn ReminderApi>,
    ) -> Self {
        let classifier = Arc::new(LanguageModelClassifier::new(
            Arc::clone(&provider),
            config.model.model.clone(),
        ));
        Self {
            augmentor: RetrievalAugmentor::from_config(classifier, &config.retrieval),
            provider,
            backend,
            reminders,
            estimator: Arc::new(HeuristicEstimator),
            model: config.model.clone(),
            memory: config.memory.clone(),
            retrieval: config.retrieval.clone(),
            window_settings: WindowSettings::from(config),
            confirm_settings: ConfirmSettings::from(&config.reminders),
            tools: ToolRegistry::with_defaults(),
            windows: Mutex::new(SessionCache::from_config(&config.session_cache)),
        }
    }

    /// Route retrieval with a different classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.augmentor = RetrievalAugmentor::from_config(classifier, &self.retrieval);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Offer a different set of tools to conversation turns.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    // ── Conversation ──────────────────────────────────────────────────────

    /// Answer a query with retrieval-augmented context.
    pub async fn converse(&self, ctx: &RequestContext, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(NO_QUERY.to_string());
        }
        info!(session = %ctx.session_id, user = %ctx.user_id, "Conversation turn");

        let mut window = self.checkout(&ctx.session_id).await?;
        let result = self.converse_in(ctx, &mut window, query).await;
        self.checkin(window).await;
        result
    }

    async fn converse_in(&self, ctx: &RequestContext, window: &mut ChatWindow, query: &str) -> Result<String> {
        let sources: Vec<Arc<dyn RetrievalSource>> = vec![
            Arc::new(ChatHistorySource::new(window.messages())),
            Arc::new(
                UserMemorySource::new(
                    Arc::clone(&self.backend),
                    ctx.user_id.clone(),
                    self.memory.user_memories_search_limit,
                )
                .with_recency_boost(self.memory.recency_boost),
            ),
            Arc::new(KnowledgeBaseSource::new(
                Arc::clone(&self.backend),
                self.memory.knowledge_search_limit,
            )),
        ];

        let message = format!("UserId: {}, Query: {}", ctx.user_id, query);
        let augmented = self.augmentor.augment(&message, query, &sources).await;
        window.append(Some(Message::user(augmented))).await?;

        let user_name = self.resolve_user_name(ctx).await;
        let system = prompts::conversation(user_name.as_deref(), ctx.local_now(), ctx.time_zone);
        let tool_ctx = ToolContext {
            now: ctx.received_at,
            time_zone: ctx.time_zone,
        };

        let mut rounds = 0;
        let response = loop {
            let mut request = self.request(system.clone(), window.messages());
            if rounds < MAX_TOOL_ROUNDS {
                request.tools = self.tools.definitions();
            }
            let response = self.provider.complete(request).await?;
            if response.tool_calls.is_empty() || rounds == MAX_TOOL_ROUNDS {
                break response;
            }
            rounds += 1;
            self.run_tools(window, &tool_ctx, response.content.trim(), response.tool_calls)
                .await?;
        };

        let reply = if response.tool_calls.is_empty() {
            response.content.trim()
        } else {
            warn!(session = %ctx.session_id, rounds, "Model kept calling tools past the limit");
            ""
        };
        if reply.is_empty() {
            warn!(session = %ctx.session_id, "Model returned an empty reply");
            window.append(None).await?;
            return Ok(FALLBACK_REPLY.to_string());
        }

        window.append(Some(Message::assistant(reply))).await?;
        debug!(session = %ctx.session_id, chars = reply.len(), rounds, "Conversation reply");
        Ok(reply.to_string())
    }

    /// Append the assistant's tool calls, then one result per call.
    async fn run_tools(
        &self,
        window: &mut ChatWindow,
        tool_ctx: &ToolContext,
        content: &str,
        calls: Vec<MessageToolCall>,
    ) -> Result<()> {
        window
            .append(Some(Message::assistant_tool_calls(content, calls.clone())))
            .await?;

        for call in calls {
            let output = match self.tools.execute(&call.name, &call.arguments, tool_ctx).await {
                Ok(output) => {
                    debug!(tool = %call.name, output = %output, "Tool call succeeded");
                    output
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    format!("Error: {e}")
                }
            };
            window.append(Some(Message::tool_result(call.id, output))).await?;
        }
        Ok(())
    }

    // ── Remember ──────────────────────────────────────────────────────────

    /// Store a user memory and, when the model suggests one, offer a reminder.
    pub async fn remember(
        &self,
        ctx: &RequestContext,
        attrs: &mut SessionAttributes,
        memory: &str,
    ) -> Result<RememberOutcome> {
        let memory = memory.trim();
        if memory.is_empty() {
            return Ok(RememberOutcome::Failed {
                speech: NO_MEMORY.to_string(),
            });
        }

        let local = ctx.local_now();
        let record = MemoryRecord {
            id: String::new(),
            namespace: Namespace::UserMemories(ctx.user_id.clone()),
            text: format!("Memory from {}: {}", local.format(SCHEDULE_FORMAT), memory),
            session_id: Some(ctx.session_id.clone()),
        };
        let memory_id = match self.bounded("store", self.backend.store(record)).await {
            Ok(id) => id,
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Failed to store memory");
                return Ok(RememberOutcome::Failed {
                    speech: STORE_FAILED.to_string(),
                });
            }
        };
        info!(user = %ctx.user_id, memory_id = %memory_id, "Stored user memory");

        let mut window = self.checkout(&ctx.session_id).await?;
        let result = self.remember_in(ctx, attrs, &mut window, memory, memory_id).await;
        self.checkin(window).await;
        result
    }

    async fn remember_in(
        &self,
        ctx: &RequestContext,
        attrs: &mut SessionAttributes,
        window: &mut ChatWindow,
        memory: &str,
        memory_id: String,
    ) -> Result<RememberOutcome> {
        let message = format!(
            "UserId: {}, Query: User asked to store this memory: {}",
            ctx.user_id, memory
        );
        window.append(Some(Message::user(message))).await?;

        let user_name = self.resolve_user_name(ctx).await;
        let system = prompts::remember(user_name.as_deref(), ctx.local_now(), ctx.time_zone);
        let extraction = match self.provider.complete(self.request(system, window.messages())).await {
            Ok(response) => match ReminderExtraction::parse(&response.content) {
                Ok(extraction) => Some(extraction),
                Err(e) => {
                    warn!(error = %e, reply = %response.content, "Unparseable memory analysis");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Memory analysis failed");
                None
            }
        };

        let Some(extraction) = extraction else {
            window.append(Some(Message::assistant(STORED_ACK))).await?;
            return Ok(RememberOutcome::Stored {
                memory_id,
                speech: STORED_ACK.to_string(),
            });
        };

        let answer = match extraction.answer.trim() {
            "" => STORED_ACK.to_string(),
            answer => answer.to_string(),
        };
        window.append(Some(Message::assistant(answer.clone()))).await?;

        match extraction.reminder_spec() {
            Some(spec) => {
                let speech = vocalis_reminders::offer(attrs, &spec, &answer);
                Ok(RememberOutcome::ReminderOffered { memory_id, speech, spec })
            }
            None => Ok(RememberOutcome::Stored {
                memory_id,
                speech: answer,
            }),
        }
    }

    // ── Reminders ─────────────────────────────────────────────────────────

    pub fn reminder_state(&self, attrs: &SessionAttributes) -> ConfirmationState {
        vocalis_reminders::state(attrs)
    }

    /// The user said yes to a pending reminder.
    pub async fn confirm_reminder(
        &self,
        ctx: &RequestContext,
        attrs: &mut SessionAttributes,
    ) -> std::result::Result<ConfirmOutcome, ReminderError> {
        vocalis_reminders::confirm(
            attrs,
            self.reminders.as_ref(),
            ctx.received_at,
            ctx.time_zone,
            &self.confirm_settings,
        )
        .await
    }

    /// The user said no to a pending reminder.
    pub fn decline_reminder(&self, attrs: &mut SessionAttributes) -> String {
        vocalis_reminders::decline(attrs)
    }

    /// The user moved on without answering: drop the pending reminder
    /// silently. Returns whether one was pending.
    pub fn abandon_reminder(&self, attrs: &mut SessionAttributes) -> bool {
        match vocalis_reminders::take_pending(attrs) {
            Some(spec) => {
                info!(topic = %spec.topic, "Pending reminder abandoned");
                true
            }
            None => false,
        }
    }

    // ── Users ─────────────────────────────────────────────────────────────

    /// The stored name of `user_id`, if they ever introduced themselves.
    pub async fn user_name(&self, user_id: &str) -> Option<String> {
        if user_id.trim().is_empty() {
            return None;
        }
        let request = SearchRequest::new(Namespace::Users(user_id.to_string()), "", 1);
        match self.bounded("search", self.backend.search(request)).await {
            Ok(hits) => hits
                .into_iter()
                .next()
                .map(|hit| hit.text.trim().to_string())
                .filter(|name| !name.is_empty()),
            Err(e) => {
                warn!(user = %user_id, error = %e, "User lookup failed");
                None
            }
        }
    }

    async fn resolve_user_name(&self, ctx: &RequestContext) -> Option<String> {
        match ctx.user_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => self.user_name(&ctx.user_id).await,
        }
    }

    /// The user told us their name. A known user is greeted back under the
    /// stored name; a new one is stored in the users namespace.
    pub async fn introduce(&self, ctx: &RequestContext, name: &str) -> Result<IntroOutcome> {
        if let Some(known) = self.user_name(&ctx.user_id).await {
            info!(user = %ctx.user_id, "Recognized existing user");
            let speech = self
                .phrase(
                    prompts::INTRO,
                    format!("I know you {known}"),
                    format!("Welcome back, {known}! Good to have you here again."),
                )
                .await;
            return Ok(IntroOutcome::Recognized { name: known, speech });
        }

        let name: String = name.chars().filter(|c| !c.is_control()).collect();
        let name = name.trim();
        if name.is_empty() {
            info!(user = %ctx.user_id, "Introduction without a name");
            return Ok(IntroOutcome::Failed {
                speech: NO_NAME.to_string(),
            });
        }

        let stored = if name.chars().count() > MAX_NAME_CHARS {
            warn!(user = %ctx.user_id, chars = name.chars().count(), "Name too long to store");
            false
        } else {
            let record = MemoryRecord {
                id: ctx.user_id.clone(),
                namespace: Namespace::Users(ctx.user_id.clone()),
                text: name.to_string(),
                session_id: None,
            };
            match self.bounded("store", self.backend.store(record)).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(user = %ctx.user_id, error = %e, "Failed to store user");
                    false
                }
            }
        };

        if !stored {
            let speech = self
                .phrase(
                    prompts::INTRO,
                    format!("Error saving new user {name}"),
                    INTRO_FAILED.to_string(),
                )
                .await;
            return Ok(IntroOutcome::Failed { speech });
        }

        info!(user = %ctx.user_id, "Stored new user");
        let speech = self
            .phrase(
                prompts::INTRO,
                format!("New user {name} saved successfully"),
                format!("Pleasure to meet you, {name}. I'll remember you from now on."),
            )
            .await;
        Ok(IntroOutcome::Welcomed {
            name: name.to_string(),
            speech,
        })
    }

    // ── Forget ────────────────────────────────────────────────────────────

    /// Delete the user memory that best matches `text`.
    pub async fn forget(&self, ctx: &RequestContext, text: &str) -> Result<ForgetOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(ForgetOutcome::NotFound {
                speech: NOTHING_TO_FORGET.to_string(),
            });
        }

        let request = SearchRequest::new(Namespace::UserMemories(ctx.user_id.clone()), text, 1);
        let memory_id = match self.bounded("search", self.backend.search(request)).await {
            Ok(hits) => hits.into_iter().next().and_then(|h| h.id),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Memory lookup failed");
                return Ok(ForgetOutcome::Failed {
                    speech: DELETION_FAILED.to_string(),
                });
            }
        };
        let Some(memory_id) = memory_id else {
            info!(user = %ctx.user_id, "No memory matches the forget request");
            return Ok(ForgetOutcome::NotFound {
                speech: MEMORY_NOT_FOUND.to_string(),
            });
        };

        match self.bounded("forget", self.backend.forget(&memory_id)).await {
            Ok(true) => {}
            Ok(false) => {
                return Ok(ForgetOutcome::NotFound {
                    speech: MEMORY_NOT_FOUND.to_string(),
                });
            }
            Err(e) => {
                warn!(memory_id = %memory_id, error = %e, "Failed to delete memory");
                return Ok(ForgetOutcome::Failed {
                    speech: DELETION_FAILED.to_string(),
                });
            }
        }
        info!(user = %ctx.user_id, memory_id = %memory_id, "Forgot user memory");

        let speech = self
            .phrase(
                prompts::FORGET,
                format!("Successfully deleted memory: {text}"),
                FORGOTTEN_ACK.to_string(),
            )
            .await;
        Ok(ForgetOutcome::Forgotten { memory_id, speech })
    }

    // ── Knowledge ─────────────────────────────────────────────────────────

    /// Store a global fact. Returns the entry id, or `None` for blank text.
    pub async fn add_knowledge(&self, text: &str) -> Result<Option<String>> {
        let fact = sanitize_fact(text);
        if fact.trim().is_empty() {
            return Ok(None);
        }

        let record = MemoryRecord {
            id: format!("knowledge.entry.{}", uuid::Uuid::new_v4()),
            namespace: Namespace::Knowledge,
            text: format!(
                "Fact from {}, {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                fact
            ),
            session_id: None,
        };
        let id = self.bounded("store", self.backend.store(record)).await?;
        info!(id = %id, "Stored knowledge entry");
        Ok(Some(id))
    }

    // ── Session ───────────────────────────────────────────────────────────

    /// The session's current window contents.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let window = self.checkout(session_id).await?;
        let messages = window.messages().to_vec();
        self.checkin(window).await;
        Ok(messages)
    }

    /// Forget the session's chat history.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.windows.lock().await.remove(session_id);
        self.bounded("delete", self.backend.delete(session_id)).await?;
        info!(session = %session_id, "Session cleared");
        Ok(())
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    async fn checkout(&self, session_id: &str) -> Result<ChatWindow> {
        let cached = self.windows.lock().await.checkout(session_id, Instant::now());
        match cached {
            Some(window) => Ok(window),
            None => {
                ChatWindow::load(
                    session_id,
                    Arc::clone(&self.backend),
                    Arc::clone(&self.estimator),
                    self.window_settings.clone(),
                )
                .await
            }
        }
    }

    async fn checkin(&self, window: ChatWindow) {
        let session_id = window.session_id().to_string();
        self.windows.lock().await.checkin(session_id, window, Instant::now());
    }

    fn request(&self, system: String, messages: &[Message]) -> ProviderRequest {
        ProviderRequest {
            model: self.model.model.clone(),
            system: Some(system),
            messages: messages.to_vec(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            tools: Vec::new(),
        }
    }

    /// A one-shot model reply outside any window, or `fallback`.
    async fn phrase(&self, system: &str, prompt: String, fallback: String) -> String {
        let request = ProviderRequest::prompt(&self.model.model, system, prompt);
        match self.provider.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content.trim().to_string(),
            Ok(_) => fallback,
            Err(e) => {
                warn!(error = %e, "Could not phrase the reply");
                fallback
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = std::result::Result<T, MemoryError>>,
    ) -> std::result::Result<T, Error> {
        let timeout = Duration::from_millis(self.memory.timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MemoryError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.memory.timeout_ms,
            }
            .into()),
        }
    }
}

/// Flatten line breaks to spaces and drop other control characters.
fn sanitize_fact(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_break = false;
    for c in text.chars() {
        if c == '\r' || c == '\n' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
            continue;
        }
        in_break = false;
        if c == '\t' || !c.is_control() {
            out.push(c);
        }
    }
    out
}
