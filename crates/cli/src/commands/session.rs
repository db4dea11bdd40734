//! `vocalis recall` / `vocalis clear` — Chat window inspection.
//!
//! Also owns the per-session attribute files under `~/.vocalis/sessions/`,
//! which live exactly as long as the session's chat window.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vocalis_config::AppConfig;
use vocalis_core::session::SessionAttributes;

use super::{build_backend, load_config};

pub fn sessions_dir() -> PathBuf {
    AppConfig::config_dir().join("sessions")
}

/// `<dir>/<session>.json`, with the session id flattened to one file name.
fn attributes_path(dir: &Path, session: &str) -> PathBuf {
    let name: String = session
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    dir.join(format!("{}.json", name.trim_start_matches('.')))
}

pub fn load_attributes(dir: &Path, session: &str) -> SessionAttributes {
    let path = attributes_path(dir, session);
    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable session attributes");
            SessionAttributes::new()
        }),
        Err(_) => SessionAttributes::new(),
    }
}

/// Write the attributes, or delete the file once nothing is left in them.
pub fn save_attributes(dir: &Path, session: &str, attrs: &SessionAttributes) {
    if attrs.is_empty() {
        remove_attributes(dir, session);
        return;
    }

    let path = attributes_path(dir, session);
    let result = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| serde_json::to_string(attrs).map_err(|e| e.to_string()))
        .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to save session attributes");
    }
}

pub fn remove_attributes(dir: &Path, session: &str) {
    let path = attributes_path(dir, session);
    match std::fs::remove_file(&path) {
        Ok(()) => debug!(path = %path.display(), "Removed session attributes"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove session attributes"),
    }
}

pub async fn recall(session: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let backend = build_backend(&config)?;

    let messages = backend.get(session).await?;
    if messages.is_empty() {
        println!("  No stored messages for session \"{session}\".");
        return Ok(());
    }

    println!("Session \"{session}\" — {} messages ({} backend)", messages.len(), backend.name());
    println!();
    for (i, message) in messages.iter().enumerate() {
        let preview: String = message.content.chars().take(120).collect();
        let ellipsis = if message.content.chars().count() > 120 { "…" } else { "" };
        println!("  {i:>3}. [{}] {preview}{ellipsis}", message.role);
    }
    Ok(())
}

pub async fn clear(session: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let backend = build_backend(&config)?;

    if let Err(e) = backend.delete(session).await {
        warn!(session, error = %e, "Failed to clear session");
        return Err(format!("Could not clear session \"{session}\": {e}").into());
    }
    remove_attributes(&sessions_dir(), session);
    println!("✅ Cleared session \"{session}\".");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> SessionAttributes {
        let mut attrs = SessionAttributes::new();
        attrs.set("waitingForReminderConfirmation", true);
        attrs
    }

    #[test]
    fn attributes_round_trip_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        save_attributes(dir.path(), "s1", &pending());
        assert!(dir.path().join("s1.json").exists());
        assert_eq!(load_attributes(dir.path(), "s1"), pending());

        remove_attributes(dir.path(), "s1");
        assert!(!dir.path().join("s1.json").exists());
        assert!(load_attributes(dir.path(), "s1").is_empty());

        // Removing twice is quiet
        remove_attributes(dir.path(), "s1");
    }

    #[test]
    fn empty_attributes_leave_no_file() {
        let dir = tempfile::tempdir().unwrap();
        save_attributes(dir.path(), "s1", &pending());
        save_attributes(dir.path(), "s1", &SessionAttributes::new());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn session_id_stays_inside_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = attributes_path(dir.path(), "../alexa/amzn1.ask?x");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.file_name().unwrap(), "_alexa_amzn1.ask_x.json");

        save_attributes(dir.path(), "../alexa/amzn1.ask?x", &pending());
        assert_eq!(load_attributes(dir.path(), "../alexa/amzn1.ask?x"), pending());
    }

    #[test]
    fn unreadable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("s1.json"), "{not json").unwrap();
        assert!(load_attributes(dir.path(), "s1").is_empty());
    }
}
