//! Memory backend implementations for Vocalis.
//!
//! All backends implement `vocalis_core::MemoryBackend`. [`build_backend`]
//! picks one from configuration.

pub mod http;
pub mod in_memory;
pub mod noop;

pub use http::HttpMemoryBackend;
pub use in_memory::InMemoryBackend;
pub use noop::NoopMemory;

use std::sync::Arc;
use std::time::Duration;
use vocalis_config::MemoryConfig;
use vocalis_core::MemoryBackend;
use vocalis_core::error::MemoryError;

/// Build the configured memory backend.
pub fn build_backend(config: &MemoryConfig) -> Result<Arc<dyn MemoryBackend>, MemoryError> {
    let backend: Arc<dyn MemoryBackend> = match config.backend.as_str() {
        "http" => Arc::new(HttpMemoryBackend::new(
            &config.server_url,
            Duration::from_millis(config.timeout_ms),
        )?),
        "in_memory" => Arc::new(InMemoryBackend::new()),
        "none" => Arc::new(NoopMemory),
        other => {
            return Err(MemoryError::Unavailable(format!(
                "Unknown memory backend '{other}'"
            )));
        }
    };
    tracing::debug!(backend = backend.name(), "Memory backend selected");
    Ok(backend)
}
