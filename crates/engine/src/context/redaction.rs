//! User-turn redaction.
//!
//! An augmented user message carries the whole retrieval payload. Once the
//! assistant has answered, that payload is dead weight in the history, so the
//! user turn is rewritten to `Query: <original utterance>`.

use vocalis_core::message::{Message, Role};

const QUERY_MARKER: &str = "Query: ";
const AUGMENTATION_MARKER: &str = "\n\nAnswer using";
const MEMORY_PREFIX: &str = "User asked to store this memory:";

/// Recover the bare utterance from an augmented user message.
///
/// Text without a `Query: ` marker is returned unchanged.
pub fn extract_original_query(content: &str) -> String {
    let Some(start) = content.find(QUERY_MARKER) else {
        return content.to_string();
    };
    let mut query = &content[start + QUERY_MARKER.len()..];

    match query.find(AUGMENTATION_MARKER) {
        Some(end) if end > 0 => query = query[..end].trim(),
        _ => {
            if let Some(end) = query.find('\n').filter(|&i| i > 0) {
                query = query[..end].trim();
            }
        }
    }

    match query.strip_prefix(MEMORY_PREFIX) {
        Some(rest) => rest.trim().to_string(),
        None => query.to_string(),
    }
}

/// Rewrite the most recent user message in place.
///
/// Returns `true` if a message was rewritten. Blank extractions leave the
/// message untouched.
pub fn redact_last_user_turn(messages: &mut [Message]) -> bool {
    let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) else {
        return false;
    };

    let clean = extract_original_query(&last_user.content);
    if clean.trim().is_empty() {
        return false;
    }

    last_user.content = format!("{QUERY_MARKER}{clean}");
    true
}
