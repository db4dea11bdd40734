//! Error types for the Vocalis domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] aggregates them.
//!
//! Propagation policy: memory-backend and single-source retrieval failures are
//! swallowed at the component boundary. Only [`EstimationError`] and malformed
//! reminder requests are allowed to abort a turn.

use thiserror::Error;

/// The top-level error type for all Vocalis operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory backend errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Token estimation (fatal for a chat window) ---
    #[error("Estimation error: {0}")]
    Estimation(#[from] EstimationError),

    // --- Reminder scheduling ---
    #[error("Reminder error: {0}")]
    Reminder(#[from] ReminderError),

    // --- Session attribute mismatch (waiting flag without a pending reminder or vice versa) ---
    #[error("Inconsistent session state: {0}")]
    InconsistentSessionState(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures talking to the memory backend. All of them are "backend
/// unavailable" from the caller's point of view: recoverable by returning
/// empty or stale results.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory backend unavailable: {0}")]
    Unavailable(String),

    #[error("Memory backend timed out during {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Unexpected response from memory backend (status {status}): {message}")]
    Protocol { status: u16, message: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum EstimationError {
    #[error("Token estimator not configured: {0}")]
    NotConfigured(String),

    #[error("Token estimation failed: {0}")]
    Failed(String),
}

/// A tool call the engine could not run. Reported back to the model as the
/// tool result rather than failing the turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReminderError {
    #[error("Unsupported recurrence: {0}")]
    UnsupportedRecurrence(String),

    #[error("Reminder permission has not been granted")]
    PermissionDenied,

    #[error("Scheduled time {0} has already passed")]
    ScheduleInPast(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(String),

    #[error("Reminder API failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Reminder API timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ReminderError {
    /// The spoken explanation for errors the user must hear about.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedRecurrence(freq) => format!(
                "I'm sorry, but I can only set daily or weekly recurring reminders, not {}.",
                freq.to_lowercase()
            ),
            Self::PermissionDenied => {
                "I need permission to create reminders. Please enable the Reminders \
                 permission in your companion app and ask me again."
                    .into()
            }
            Self::ScheduleInPast(_) => {
                "That time has already passed, so I couldn't set the reminder.".into()
            }
            Self::InvalidSchedule(_) | Self::InvalidTimeZone(_) => {
                "I couldn't understand when that reminder should happen.".into()
            }
            Self::Api { .. } | Self::Timeout { .. } => {
                "Sorry, I couldn't create the reminder. Please try again.".into()
            }
        }
    }
}
