//! Configuration loading, validation, and management for Vocalis.
//!
//! Loads configuration from `~/.vocalis/config.toml` with environment
//! variable overrides. Validates all settings at construction so that the
//! engine components can take plain, already-checked config structs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.vocalis/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model endpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// Memory backend configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Chat window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Retrieval routing and aggregation
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reminder scheduling
    #[serde(default)]
    pub reminders: ReminderConfig,

    /// In-process session window cache
    #[serde(default)]
    pub session_cache: SessionCacheConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Model ─────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_model_timeout_secs() -> u64 {
    30
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Memory backend ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "http", "in_memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_memories_limit")]
    pub user_memories_search_limit: usize,

    #[serde(default = "default_knowledge_limit")]
    pub knowledge_search_limit: usize,

    #[serde(default = "default_true")]
    pub recency_boost: bool,
}

fn default_memory_backend() -> String {
    "http".into()
}
fn default_server_url() -> String {
    "http://localhost:8000".into()
}
fn default_memory_timeout_ms() -> u64 {
    5000
}
fn default_user_memories_limit() -> usize {
    10
}
fn default_knowledge_limit() -> usize {
    1
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            server_url: default_server_url(),
            timeout_ms: default_memory_timeout_ms(),
            user_memories_search_limit: default_user_memories_limit(),
            knowledge_search_limit: default_knowledge_limit(),
            recency_boost: true,
        }
    }
}

// ── Chat window ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Maximum estimated tokens the stored history may occupy
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Rewrite augmented user turns back to the bare utterance once answered
    #[serde(default)]
    pub redact_user_turns: bool,
}

fn default_token_budget() -> usize {
    4096
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            redact_user_turns: false,
        }
    }
}

// ── Retrieval ─────────────────────────────────────────────────────────────

/// What the router does when source selection is inconclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Query every source (higher recall)
    #[default]
    RouteToAll,
    /// Skip retrieval entirely (lowest cost)
    RouteToNone,
}

/// How retrieved content is merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    #[default]
    Concatenate,
    ScoreThreshold,
    ReciprocalRankFusion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub fallback: FallbackPolicy,

    #[serde(default)]
    pub strategy: AggregationKind,

    /// Minimum relevance for `score_threshold`
    #[serde(default)]
    pub min_score: f32,

    /// Rank constant for `reciprocal_rank_fusion`
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    #[serde(default = "default_classifier_timeout_ms")]
    pub classifier_timeout_ms: u64,
}

fn default_rrf_k() -> u32 {
    60
}
fn default_source_timeout_ms() -> u64 {
    3000
}
fn default_classifier_timeout_ms() -> u64 {
    3000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            strategy: AggregationKind::default(),
            min_score: 0.0,
            rrf_k: default_rrf_k(),
            max_items: None,
            source_timeout_ms: default_source_timeout_ms(),
            classifier_timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

// ── Reminders ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Reminder REST endpoint; absent means dry-run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Used when the device time zone cannot be determined
    #[serde(default = "default_time_zone")]
    pub default_time_zone: String,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_reminder_timeout_ms")]
    pub timeout_ms: u64,

    /// Reminders closer than this use a relative trigger
    #[serde(default = "default_max_relative_secs")]
    pub max_relative_secs: i64,
}

fn default_time_zone() -> String {
    "America/New_York".into()
}
fn default_locale() -> String {
    "en-US".into()
}
fn default_reminder_timeout_ms() -> u64 {
    5000
}
fn default_max_relative_secs() -> i64 {
    172_800
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            default_time_zone: default_time_zone(),
            locale: default_locale(),
            timeout_ms: default_reminder_timeout_ms(),
            max_relative_secs: default_max_relative_secs(),
        }
    }
}

impl std::fmt::Debug for ReminderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &redact(&self.api_token))
            .field("default_time_zone", &self.default_time_zone)
            .field("locale", &self.locale)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_relative_secs", &self.max_relative_secs)
            .finish()
    }
}

// ── Session cache ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_ttl_secs() -> u64 {
    900
}
fn default_cache_capacity() -> usize {
    256
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            capacity: default_cache_capacity(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.vocalis/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    ///
    /// Numeric variables that fail to parse are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("VOCALIS_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup("VOCALIS_MODEL").or_else(|| lookup("OPENAI_MODEL_NAME")) {
            self.model.model = model;
        }
        if let Some(url) = lookup("AGENT_MEMORY_SERVER_URL") {
            self.memory.server_url = url;
        }
        if let Some(budget) = parse_env(&lookup, "OPENAI_CHAT_MAX_TOKENS") {
            self.window.token_budget = budget;
        }
        if let Some(limit) = parse_env(&lookup, "USER_MEMORIES_SEARCH_LIMIT") {
            self.memory.user_memories_search_limit = limit;
        }
        if let Some(limit) = parse_env(&lookup, "KNOWLEDGE_BASE_SEARCH_LIMIT") {
            self.memory.knowledge_search_limit = limit;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".vocalis")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.window.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "window.token_budget must be > 0".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "http" | "in_memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of http, in_memory, none (got '{}')",
                self.memory.backend
            )));
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(ConfigError::ValidationError(
                "retrieval.min_score must be between 0.0 and 1.0".into(),
            ));
        }

        if chrono_tz::Tz::from_str(&self.reminders.default_time_zone).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "reminders.default_time_zone '{}' is not an IANA time zone",
                self.reminders.default_time_zone
            )));
        }

        if self.reminders.max_relative_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "reminders.max_relative_secs must be > 0".into(),
            ));
        }

        if self.session_cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "session_cache.capacity must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
