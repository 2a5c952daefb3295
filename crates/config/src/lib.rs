//! Configuration loading, validation, and management for MedAssist.
//!
//! Loads configuration from `~/.medassist/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use medassist_core::persona::PersonaId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.medassist/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Persona used when a query does not name one
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Backend that answers domain queries
    #[serde(default = "ModelConfig::answering")]
    pub answering: ModelConfig,

    /// Backend used for query labelling and relevance checks
    #[serde(default = "ModelConfig::classifier")]
    pub classifier: ModelConfig,

    /// Backend used for food image analysis
    #[serde(default = "ModelConfig::vision")]
    pub vision: ModelConfig,

    /// Session history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Per-call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Provider-specific configurations (keyed by provider name)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Persona prompt overrides (keyed by persona id)
    #[serde(default)]
    pub personas: HashMap<String, PersonaOverride>,
}

fn default_persona() -> String {
    PersonaId::default().as_str().into()
}

/// Which provider and model serve one kind of call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,

    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.1
}

impl ModelConfig {
    fn answering() -> Self {
        Self {
            provider: "perplexity".into(),
            model: "sonar".into(),
            temperature: 0.1,
            max_tokens: Some(1500),
        }
    }

    fn classifier() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: Some(10),
        }
    }

    fn vision() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: Some(1000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    medassist_core::DEFAULT_MAX_HISTORY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// Bounded waits for each external call, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_classify_secs")]
    pub classify_secs: u64,

    #[serde(default = "default_answer_secs")]
    pub answer_secs: u64,

    /// Maximum wait between two frames of a streamed answer
    #[serde(default = "default_frame_secs")]
    pub frame_secs: u64,

    #[serde(default = "default_vision_secs")]
    pub vision_secs: u64,
}

fn default_classify_secs() -> u64 {
    15
}
fn default_answer_secs() -> u64 {
    60
}
fn default_frame_secs() -> u64 {
    30
}
fn default_vision_secs() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classify_secs: default_classify_secs(),
            answer_secs: default_answer_secs(),
            frame_secs: default_frame_secs(),
            vision_secs: default_vision_secs(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Replaces parts of a built-in persona.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Switch the persona to keyword-based scope validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.medassist/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PPLX_API_KEY` / `PERPLEXITY_API_KEY` for the `perplexity` provider
    /// - `OPENAI_API_KEY` for the `openai` provider
    /// - `MEDASSIST_PERSONA` overrides `default_persona`
    /// - `MEDASSIST_ANSWER_MODEL` overrides `answering.model`
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

    /// Apply environment overrides through `lookup`. Keys in the config file
    /// win over environment keys; the persona and model overrides always win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env_keys: [(&str, &[&str]); 2] = [
            ("perplexity", &["PPLX_API_KEY", "PERPLEXITY_API_KEY"]),
            ("openai", &["OPENAI_API_KEY"]),
        ];
        for (provider, vars) in env_keys {
            let entry = self.providers.entry(provider.to_string()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = vars.iter().find_map(|v| lookup(v));
            }
        }

        if let Some(persona) = lookup("MEDASSIST_PERSONA") {
            self.default_persona = persona;
        }

        if let Some(model) = lookup("MEDASSIST_ANSWER_MODEL") {
            self.answering.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".medassist")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if PersonaId::parse(&self.default_persona).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "default_persona '{}' is not one of glp1, general_med",
                self.default_persona
            )));
        }

        for id in self.personas.keys() {
            if PersonaId::parse(id).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "[personas.{id}] does not name a known persona"
                )));
            }
        }

        for (section, model) in [
            ("answering", &self.answering),
            ("classifier", &self.classifier),
            ("vision", &self.vision),
        ] {
            if model.temperature < 0.0 || model.temperature > 2.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.temperature must be between 0.0 and 2.0"
                )));
            }
            if model.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.model must not be empty"
                )));
            }
        }

        if self.history.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_entries must be at least 1".into(),
            ));
        }

        let t = &self.timeouts;
        if [t.classify_secs, t.answer_secs, t.frame_secs, t.vision_secs].contains(&0) {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// The API key configured for `provider`, if any.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.as_deref())
    }

    /// The configured default persona. Validation guarantees it parses.
    pub fn persona(&self) -> PersonaId {
        PersonaId::parse(&self.default_persona).unwrap_or_default()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_persona: default_persona(),
            answering: ModelConfig::answering(),
            classifier: ModelConfig::classifier(),
            vision: ModelConfig::vision(),
            history: HistoryConfig::default(),
            timeouts: TimeoutConfig::default(),
            providers: HashMap::new(),
            personas: HashMap::new(),
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
