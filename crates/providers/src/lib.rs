//! LLM provider implementations for Vocalis.
//!
//! All providers implement the `vocalis_core::Provider` trait. The model is a
//! black box to the engine; only the OpenAI-compatible wire format is shipped.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;
use vocalis_config::ModelConfig;
use vocalis_core::Provider;
use vocalis_core::error::ProviderError;

/// Build the configured provider. Fails if no API key is available.
pub fn build_from_config(config: &ModelConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key; set model.api_key or OPENAI_API_KEY".into(),
        )
    })?;

    let provider = OpenAiCompatProvider::new(
        "openai_compat",
        &config.api_url,
        api_key,
        Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(provider))
}
