pub mod agent;
pub mod knowledge;
pub mod onboard;
pub mod session;

use std::sync::Arc;
use vocalis_config::AppConfig;
use vocalis_core::MemoryBackend;
use vocalis_engine::Orchestrator;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub fn build_backend(config: &AppConfig) -> Result<Arc<dyn MemoryBackend>, Box<dyn std::error::Error>> {
    Ok(vocalis_memory::build_backend(&config.memory)?)
}

/// Wire the model, the memory backend and the reminder API together.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let provider = vocalis_providers::build_from_config(&config.model).map_err(|e| {
        format!(
            "{e}\n  Set VOCALIS_API_KEY or OPENAI_API_KEY, or add api_key under [model] in {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;
    let backend = build_backend(config)?;
    let reminders = vocalis_reminders::build_api(&config.reminders)?;
    Ok(Orchestrator::new(config, provider, backend, reminders))
}
