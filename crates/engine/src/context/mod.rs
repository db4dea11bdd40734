//! Chat context management.
//!
//! - [`window`]: the token-bounded, persisted message history of a session
//! - [`token`]: size estimation used by the window's eviction
//! - [`redaction`]: rewriting answered user turns to their bare query

pub mod redaction;
pub mod token;
pub mod window;

pub use redaction::{extract_original_query, redact_last_user_turn};
pub use token::{HeuristicEstimator, TokenEstimator, estimate_messages_tokens, estimate_tokens};
pub use window::{ChatWindow, PersistOutcome, WindowSettings, enforce_budget};
