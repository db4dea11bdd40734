//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This
//! approximation is within ~10% for BPE tokenizers on English text, which is
//! enough to keep a chat window under the model's context limit.
//!
//! The window only needs *some* monotone estimate, so the estimator is a
//! trait; a real tokenizer can be plugged in without touching eviction.

use vocalis_core::error::EstimationError;
use vocalis_core::message::Message;

/// Estimates how many tokens a message list occupies.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, messages: &[Message]) -> Result<usize, EstimationError>;
}

/// The default ≈4 chars/token estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, messages: &[Message]) -> Result<usize, EstimationError> {
        Ok(estimate_messages_tokens(messages))
    }
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name, delimiters,
/// and formatting markers in the API wire format. Tool calls are counted
/// by the length of their JSON encoding.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|tc| estimate_tokens(&serde_json::to_string(tc).unwrap_or_default()))
        .sum();
    overhead + estimate_tokens(&message.content) + calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
