//! Configuration loading, validation, and management for GameKit.
//!
//! Loads configuration from `~/.gamekit/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.gamekit/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout at the model-call boundary (0 = none)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Root directory for the file tools (defaults to `~/.gamekit/workspace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// AI review settings
    #[serde(default)]
    pub review: ReviewSettings,

    /// Caller-supplied action context properties (e.g. `target_language`)
    #[serde(default = "default_properties")]
    pub properties: Map<String, Value>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_request_timeout() -> u64 {
    120
}
fn default_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("target_language".into(), Value::String("python".into()));
    props
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("workspace", &self.workspace)
            .field("agent", &self.agent)
            .field("review", &self.review)
            .field("properties", &self.properties)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Hard cap on loop iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// How many levels deep agents may delegate to one another
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: usize,

    /// Tool descriptions longer than this are truncated in prompts
    #[serde(default = "default_description_limit")]
    pub description_limit: usize,
}

fn default_max_iterations() -> usize {
    10
}
fn default_max_delegation_depth() -> usize {
    3
}
fn default_description_limit() -> usize {
    1024
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_delegation_depth: default_max_delegation_depth(),
            description_limit: default_description_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSettings {
    /// Attempts per reviewed action before giving up
    #[serde(default = "default_max_review_iterations")]
    pub max_review_iterations: usize,

    /// Actions executed once without review
    #[serde(default = "default_immediate_actions")]
    pub immediate_actions: Vec<String>,

    /// Actions whose output is judged before it is accepted
    #[serde(default = "default_review_actions")]
    pub review_actions: Vec<String>,
}

fn default_max_review_iterations() -> usize {
    3
}
fn default_immediate_actions() -> Vec<String> {
    [
        "parse_gherkin",
        "extract_scenarios",
        "validate_gherkin_syntax",
        "read_existing_code",
        "extract_clean_code",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_review_actions() -> Vec<String> {
    [
        "generate_step_definitions",
        "generate_test_implementation",
        "generate_production_code",
        "refactor_existing_code",
        "generate_complete_function",
        "generate_bdd_tests",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            max_review_iterations: default_max_review_iterations(),
            immediate_actions: default_immediate_actions(),
            review_actions: default_review_actions(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.gamekit/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `GAMEKIT_API_KEY`, then `OPENAI_API_KEY` (only if no key is configured)
    /// - `GAMEKIT_API_URL`
    /// - `GAMEKIT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("GAMEKIT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("GAMEKIT_API_URL") {
            self.api_url = url;
        }
        if let Some(model) = lookup("GAMEKIT_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".gamekit")
    }

    /// The directory file tools are rooted at.
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.review.max_review_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "review.max_review_iterations must be at least 1".into(),
            ));
        }

        if let Some(name) = self
            .review
            .immediate_actions
            .iter()
            .find(|n| self.review.review_actions.contains(n))
        {
            return Err(ConfigError::ValidationError(format!(
                "action '{name}' is listed as both immediate and reviewed"
            )));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            workspace: None,
            agent: AgentSettings::default(),
            review: ReviewSettings::default(),
            properties: default_properties(),
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
