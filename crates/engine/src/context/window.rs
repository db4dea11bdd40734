//! Bounded chat window — the persisted history of one session.
//!
//! The window is loaded from the memory backend at the start of a turn,
//! mutated with [`ChatWindow::append`], and written back after every
//! mutation. Its estimated size never exceeds the token budget, except when
//! the only way down would be an empty window.
//!
//! # Eviction
//!
//! Oldest first, system messages kept. When the evicted message is an
//! assistant turn that issued tool calls, its tool results (up to the next
//! user message) go with it, so no orphan tool result is ever left behind.
//!
//! # Failure policy
//!
//! Backend failures degrade: a failed load yields an empty window and a
//! failed persist is reported as [`PersistOutcome::Failed`]. Estimator
//! failures are fatal and surface as `Error::Estimation`.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vocalis_config::AppConfig;
use vocalis_core::MemoryBackend;
use vocalis_core::Result;
use vocalis_core::message::{Message, Role};

use super::redaction::redact_last_user_turn;
use super::token::TokenEstimator;

/// Knobs for a [`ChatWindow`].
#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub token_budget: usize,
    /// Upper bound for each backend call
    pub backend_timeout: Duration,
    /// Rewrite the answered user turn to its bare query
    pub redact_user_turns: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            token_budget: 4096,
            backend_timeout: Duration::from_secs(5),
            redact_user_turns: false,
        }
    }
}

impl From<&AppConfig> for WindowSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            token_budget: config.window.token_budget,
            backend_timeout: Duration::from_millis(config.memory.timeout_ms),
            redact_user_turns: config.window.redact_user_turns,
        }
    }
}

/// Whether the last write reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    Failed,
}

/// Evict messages until `messages` fits in `budget`.
///
/// Returns the number of evicted messages. Never evicts the last message,
/// and never splits an assistant turn from its tool results.
pub fn enforce_budget(
    messages: &mut Vec<Message>,
    budget: usize,
    estimator: &dyn TokenEstimator,
) -> Result<usize> {
    let mut evicted = 0;

    while messages.len() > 1 && estimator.estimate(messages)? > budget {
        let index = messages
            .iter()
            .position(|m| m.role != Role::System)
            .unwrap_or(0);

        let mut cascade = Vec::new();
        if messages[index].has_tool_calls() {
            cascade = messages[index + 1..]
                .iter()
                .enumerate()
                .take_while(|(_, m)| m.role != Role::User)
                .filter(|(_, m)| m.role == Role::ToolResult)
                .map(|(offset, _)| index + 1 + offset)
                .collect();
        }

        if cascade.len() + 1 >= messages.len() {
            // The whole window is one tool exchange; keep it rather than empty the window
            warn!(
                messages = messages.len(),
                budget, "Cannot evict further without emptying the window"
            );
            break;
        }

        for &i in cascade.iter().rev() {
            messages.remove(i);
        }
        messages.remove(index);
        evicted += cascade.len() + 1;
    }

    Ok(evicted)
}

/// The token-bounded message history of one session.
pub struct ChatWindow {
    session_id: String,
    messages: Vec<Message>,
    backend: Arc<dyn MemoryBackend>,
    estimator: Arc<dyn TokenEstimator>,
    settings: WindowSettings,
}

impl std::fmt::Debug for ChatWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWindow")
            .field("session_id", &self.session_id)
            .field("messages", &self.messages.len())
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatWindow {
    /// Load the window of `session_id`, trimming it if it is over budget.
    pub async fn load(
        session_id: impl Into<String>,
        backend: Arc<dyn MemoryBackend>,
        estimator: Arc<dyn TokenEstimator>,
        settings: WindowSettings,
    ) -> Result<Self> {
        let session_id = session_id.into();

        let messages = match tokio::time::timeout(settings.backend_timeout, backend.get(&session_id)).await {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                warn!(session = %session_id, error = %e, "Memory backend unavailable, starting with an empty window");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    session = %session_id,
                    timeout_ms = settings.backend_timeout.as_millis() as u64,
                    "Loading the window timed out, starting with an empty window"
                );
                Vec::new()
            }
        };

        let mut window = Self {
            session_id,
            messages,
            backend,
            estimator,
            settings,
        };

        let evicted = enforce_budget(
            &mut window.messages,
            window.settings.token_budget,
            window.estimator.as_ref(),
        )?;
        if evicted > 0 {
            info!(session = %window.session_id, evicted, "Loaded window was over budget, trimmed");
            window.persist().await;
        }

        debug!(session = %window.session_id, messages = window.messages.len(), "Chat window loaded");
        Ok(window)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_budget(&self) -> usize {
        self.settings.token_budget
    }

    /// Current size estimate of the window.
    pub fn estimated_tokens(&self) -> Result<usize> {
        Ok(self.estimator.estimate(&self.messages)?)
    }

    /// Append a message, enforce the budget, and persist.
    ///
    /// `None` and blank messages leave the list untouched but the current
    /// list is still persisted. On an estimator error the window is left
    /// exactly as it was.
    pub async fn append(&mut self, message: Option<Message>) -> Result<PersistOutcome> {
        match message.filter(|m| !m.is_blank()) {
            Some(message) => {
                let mut next = self.messages.clone();
                // The retrieved context stays until the final answer, past any tool round
                if self.settings.redact_user_turns
                    && message.role == Role::Assistant
                    && !message.has_tool_calls()
                    && redact_last_user_turn(&mut next)
                {
                    debug!(session = %self.session_id, "Redacted answered user turn");
                }
                next.push(message);

                let evicted = enforce_budget(&mut next, self.settings.token_budget, self.estimator.as_ref())?;
                if evicted > 0 {
                    debug!(session = %self.session_id, evicted, "Evicted messages to fit the budget");
                }
                self.messages = next;
            }
            None => debug!(session = %self.session_id, "Nothing to append"),
        }

        Ok(self.persist().await)
    }

    /// Empty the window and delete it on the backend (best effort).
    pub async fn clear(&mut self) {
        self.messages.clear();
        match tokio::time::timeout(self.settings.backend_timeout, self.backend.delete(&self.session_id)).await {
            Ok(Ok(())) => info!(session = %self.session_id, "Chat window cleared"),
            Ok(Err(e)) => warn!(session = %self.session_id, error = %e, "Failed to delete window on backend"),
            Err(_) => warn!(session = %self.session_id, "Deleting window on backend timed out"),
        }
    }

    async fn persist(&self) -> PersistOutcome {
        match tokio::time::timeout(
            self.settings.backend_timeout,
            self.backend.put(&self.session_id, &self.messages),
        )
        .await
        {
            Ok(Ok(())) => PersistOutcome::Persisted,
            Ok(Err(e)) => {
                warn!(session = %self.session_id, error = %e, "Failed to persist chat window");
                PersistOutcome::Failed
            }
            Err(_) => {
                warn!(session = %self.session_id, "Persisting chat window timed out");
                PersistOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token::{HeuristicEstimator, estimate_messages_tokens};
    use crate::test_helpers::{FailingBackend, FailingEstimator, StalledBackend};
    use vocalis_core::Error;
    use vocalis_core::message::MessageToolCall;
    use vocalis_memory::InMemoryBackend;

    fn settings(budget: usize) -> WindowSettings {
        WindowSettings {
            token_budget: budget,
            ..WindowSettings::default()
        }
    }

    fn text(n: usize) -> String {
        "x".repeat(n)
    }

    async fn window(backend: Arc<dyn MemoryBackend>, budget: usize) -> ChatWindow {
        ChatWindow::load("s1", backend, Arc::new(HeuristicEstimator), settings(budget))
            .await
            .unwrap()
    }

    // ── enforce_budget ──

    #[test]
    fn under_budget_evicts_nothing() {
        let mut messages = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(enforce_budget(&mut messages, 100, &HeuristicEstimator).unwrap(), 0);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn evicts_oldest_non_system_first() {
        let mut messages = vec![
            Message::system("sys"),
            Message::user(text(40)),
            Message::assistant(text(40)),
            Message::user(text(40)),
        ];
        let evicted = enforce_budget(&mut messages, 30, &HeuristicEstimator).unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.len(), 2);
        assert!(estimate_messages_tokens(&messages) <= 30);
    }

    #[test]
    fn tool_results_are_evicted_with_their_call() {
        let mut messages = vec![
            Message::user(text(20)),
            Message::assistant_tool_calls("", vec![MessageToolCall::new("c1", "clock", "{}")]),
            Message::tool_result("c1", text(200)),
            Message::assistant("It is noon"),
            Message::user("thanks"),
            Message::assistant("welcome"),
        ];
        // Drop the first user turn, then the tool exchange as one cascade
        let evicted = enforce_budget(&mut messages, 30, &HeuristicEstimator).unwrap();
        assert_eq!(evicted, 3);
        assert!(messages.iter().all(|m| m.role != Role::ToolResult));
        assert_eq!(messages[0].content, "It is noon");
    }

    #[test]
    fn cascade_stops_at_next_user_message() {
        let mut messages = vec![
            Message::assistant_tool_calls("", vec![MessageToolCall::new("c1", "a", "{}")]),
            Message::tool_result("c1", "r1"),
            Message::user(text(400)),
            Message::tool_result("stray", "r2"),
        ];
        enforce_budget(&mut messages, 1, &HeuristicEstimator).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("stray"));
    }

    #[test]
    fn never_evicts_to_empty() {
        let mut messages = vec![Message::user(text(1000))];
        assert_eq!(enforce_budget(&mut messages, 1, &HeuristicEstimator).unwrap(), 0);
        assert_eq!(messages.len(), 1);

        let mut exchange = vec![
            Message::assistant_tool_calls("", vec![MessageToolCall::new("c1", "a", "{}")]),
            Message::tool_result("c1", text(1000)),
        ];
        enforce_budget(&mut exchange, 1, &HeuristicEstimator).unwrap();
        assert_eq!(exchange.len(), 2);
    }

    #[test]
    fn all_system_messages_evict_oldest() {
        let mut messages = vec![Message::system(text(100)), Message::system(text(100))];
        assert_eq!(enforce_budget(&mut messages, 40, &HeuristicEstimator).unwrap(), 1);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn estimator_failure_is_fatal() {
        let mut messages = vec![Message::user("a"), Message::user("b")];
        let err = enforce_budget(&mut messages, 10, &FailingEstimator).unwrap_err();
        assert!(matches!(err, Error::Estimation(_)));
    }

    // ── ChatWindow ──

    #[tokio::test]
    async fn append_persists_each_turn() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut w = window(backend.clone(), 4096).await;

        assert_eq!(w.append(Some(Message::user("hi"))).await.unwrap(), PersistOutcome::Persisted);
        w.append(Some(Message::assistant("hello"))).await.unwrap();

        assert_eq!(backend.get("s1").await.unwrap(), w.messages().to_vec());
        assert_eq!(backend.put_count(), 2);
    }

    #[tokio::test]
    async fn none_and_blank_persist_without_mutation() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut w = window(backend.clone(), 4096).await;
        w.append(Some(Message::user("hi"))).await.unwrap();

        w.append(None).await.unwrap();
        w.append(Some(Message::assistant("   "))).await.unwrap();

        assert_eq!(w.len(), 1);
        assert_eq!(backend.put_count(), 3);
    }

    #[tokio::test]
    async fn load_trims_oversized_history_and_persists() {
        let backend = Arc::new(InMemoryBackend::new());
        let history: Vec<Message> = (0..20).map(|i| Message::user(format!("{i}: {}", text(40)))).collect();
        backend.put("s1", &history).await.unwrap();

        let w = window(backend.clone(), 60).await;
        assert!(w.estimated_tokens().unwrap() <= 60);
        assert!(w.messages().last().unwrap().content.starts_with("19:"));
        assert_eq!(backend.get("s1").await.unwrap().len(), w.len());
    }

    #[tokio::test]
    async fn failing_backend_degrades() {
        let mut w = window(Arc::new(FailingBackend), 4096).await;
        assert!(w.is_empty());

        let outcome = w.append(Some(Message::user("hi"))).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Failed);
        assert_eq!(w.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out() {
        let settings = WindowSettings {
            backend_timeout: Duration::from_millis(50),
            ..WindowSettings::default()
        };
        let mut w = ChatWindow::load("s1", Arc::new(StalledBackend), Arc::new(HeuristicEstimator), settings)
            .await
            .unwrap();
        assert!(w.is_empty());
        assert_eq!(w.append(Some(Message::user("hi"))).await.unwrap(), PersistOutcome::Failed);
    }

    #[tokio::test]
    async fn estimator_failure_leaves_window_untouched() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut w = ChatWindow::load("s1", backend.clone(), Arc::new(HeuristicEstimator), settings(4096))
            .await
            .unwrap();
        w.append(Some(Message::user("hi"))).await.unwrap();

        w.estimator = Arc::new(FailingEstimator);
        let err = w.append(Some(Message::assistant("hello"))).await.unwrap_err();
        assert!(matches!(err, Error::Estimation(_)));
        assert_eq!(w.len(), 1);
    }

    #[tokio::test]
    async fn redaction_rewrites_answered_turn() {
        let backend = Arc::new(InMemoryBackend::new());
        let settings = WindowSettings {
            redact_user_turns: true,
            ..WindowSettings::default()
        };
        let mut w = ChatWindow::load("s1", backend, Arc::new(HeuristicEstimator), settings)
            .await
            .unwrap();

        w.append(Some(Message::user(
            "UserId: u1, Query: where did I park?\n\nAnswer using the following information:\nlevel 3",
        )))
        .await
        .unwrap();
        assert!(w.messages()[0].content.contains("level 3"));

        w.append(Some(Message::assistant("Level 3."))).await.unwrap();
        assert_eq!(w.messages()[0].content, "Query: where did I park?");
        assert_eq!(w.messages()[1].content, "Level 3.");
    }

    #[tokio::test]
    async fn tool_round_keeps_retrieved_context() {
        let backend = Arc::new(InMemoryBackend::new());
        let settings = WindowSettings {
            redact_user_turns: true,
            ..WindowSettings::default()
        };
        let mut w = ChatWindow::load("s1", backend, Arc::new(HeuristicEstimator), settings)
            .await
            .unwrap();

        w.append(Some(Message::user(
            "UserId: u1, Query: is the gym open?\n\nAnswer using the following information:\nopen until 9",
        )))
        .await
        .unwrap();
        w.append(Some(Message::assistant_tool_calls(
            "",
            vec![MessageToolCall::new("c1", "date_time", r#"{"operation":"now"}"#)],
        )))
        .await
        .unwrap();
        w.append(Some(Message::tool_result("c1", "2026-01-05T10:00:00"))).await.unwrap();
        assert!(w.messages()[0].content.contains("open until 9"));

        w.append(Some(Message::assistant("Yes, until 9."))).await.unwrap();
        assert_eq!(w.messages()[0].content, "Query: is the gym open?");
        assert_eq!(w.len(), 4);
    }

    #[tokio::test]
    async fn clear_empties_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut w = window(backend.clone(), 4096).await;
        w.append(Some(Message::user("hi"))).await.unwrap();

        w.clear().await;
        assert!(w.is_empty());
        assert!(backend.get("s1").await.unwrap().is_empty());
    }
}
