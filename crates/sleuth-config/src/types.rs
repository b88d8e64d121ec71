//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]        # model service
//! [agent]      # recursion and pacing
//! [logging]    # optional JSON log directory
//! ```
//!
//! Every field is optional so partial files (a project-local `sleuth.toml`
//! overriding one key) can be layered over the user config.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleuthConfig {
    pub llm: Option<LlmConfig>,
    pub agent: Option<AgentSection>,
    pub logging: Option<LoggingConfig>,
}

impl SleuthConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one, key by key (other wins).
    pub fn merge(&mut self, other: SleuthConfig) {
        merge_section(&mut self.llm, other.llm, LlmConfig::merge);
        merge_section(&mut self.agent, other.agent, AgentSection::merge);
        merge_section(&mut self.logging, other.logging, LoggingConfig::merge);
    }
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
    match (base.as_mut(), other) {
        (Some(existing), Some(incoming)) => merge(existing, incoming),
        (None, Some(incoming)) => *base = Some(incoming),
        (_, None) => {}
    }
}

fn overlay<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [llm]
// ─────────────────────────────────────────────────────────────────────────────

/// Model-service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend provider.
    pub backend: Option<Backend>,
    /// Model identifier.
    pub model: Option<String>,
    /// Custom API base URL (proxies, local servers).
    pub base_url: Option<String>,
    /// API key (prefer the environment; warns if set here).
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Maximum retry attempts for failed requests.
    pub retry_max: Option<u32>,
    /// Backoff delay between retries in milliseconds.
    pub retry_backoff_ms: Option<u64>,
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn merge(&mut self, other: LlmConfig) {
        overlay(&mut self.backend, other.backend);
        overlay(&mut self.model, other.model);
        overlay(&mut self.base_url, other.base_url);
        overlay(&mut self.api_key, other.api_key);
        overlay(&mut self.timeout_secs, other.timeout_secs);
        overlay(&mut self.retry_max, other.retry_max);
        overlay(&mut self.retry_backoff_ms, other.retry_backoff_ms);
    }
}

/// Supported model-service providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gemini,
    Openai,
    Groq,
    Ollama,
}

impl Backend {
    /// Environment variable holding this backend's API key, if it needs one.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Backend::Gemini => Some("GEMINI_API_KEY"),
            Backend::Openai => Some("OPENAI_API_KEY"),
            Backend::Groq => Some("GROQ_API_KEY"),
            Backend::Ollama => None,
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Gemini => "Gemini",
            Backend::Openai => "OpenAI",
            Backend::Groq => "Groq",
            Backend::Ollama => "Ollama",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::Gemini => "gemini-2.5-flash",
            Backend::Openai => "gpt-4o-mini",
            Backend::Groq => "llama-3.3-70b-versatile",
            Backend::Ollama => "llama3.2",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Backend {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Backend::Gemini),
            "openai" => Ok(Backend::Openai),
            "groq" => Ok(Backend::Groq),
            "ollama" => Ok(Backend::Ollama),
            other => Err(crate::ConfigError::invalid(
                "llm.backend",
                format!("unknown backend '{}' (expected gemini, openai, groq or ollama)", other),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [agent]
// ─────────────────────────────────────────────────────────────────────────────

/// Recursion and pacing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Deepest level allowed to call the model.
    pub max_depth: Option<u32>,
    /// Pause before each sub-agent spawn, in milliseconds.
    pub rate_limit_delay_ms: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub mode: Option<ToolMode>,
}

impl AgentSection {
    fn merge(&mut self, other: AgentSection) {
        overlay(&mut self.max_depth, other.max_depth);
        overlay(&mut self.rate_limit_delay_ms, other.rate_limit_delay_ms);
        overlay(&mut self.max_tokens, other.max_tokens);
        overlay(&mut self.temperature, other.temperature);
        overlay(&mut self.mode, other.mode);
    }
}

/// How tool calls are driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// The agent loops over tool calls itself.
    #[default]
    Manual,
    /// The chat session dispatches calls through a handler.
    Automatic,
}

// ─────────────────────────────────────────────────────────────────────────────
// [logging]
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling JSON log files. Unset disables file logs.
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    fn merge(&mut self, other: LoggingConfig) {
        overlay(&mut self.directory, other.directory);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = SleuthConfig::new();
        assert!(config.llm.is_none());
        assert!(config.agent.is_none());
        assert!(config.logging.is_none());
        assert_eq!(SleuthConfig::from_toml("").unwrap(), config);
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
[llm]
backend = "groq"
model = "llama-3.3-70b-versatile"
timeout_secs = 60
retry_max = 2

[agent]
max_depth = 3
rate_limit_delay_ms = 0
temperature = 0.2
mode = "automatic"

[logging]
directory = "/var/log/sleuth"
"#;
        let config = SleuthConfig::from_toml(toml).unwrap();
        let llm = config.llm.as_ref().unwrap();
        assert_eq!(llm.backend, Some(Backend::Groq));
        assert_eq!(llm.timeout_secs, Some(60));
        assert_eq!(llm.retry_max, Some(2));

        let agent = config.agent.as_ref().unwrap();
        assert_eq!(agent.max_depth, Some(3));
        assert_eq!(agent.rate_limit_delay_ms, Some(0));
        assert_eq!(agent.mode, Some(ToolMode::Automatic));
        assert!(agent.max_tokens.is_none());

        assert_eq!(
            config.logging.unwrap().directory,
            Some(PathBuf::from("/var/log/sleuth"))
        );
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let err = SleuthConfig::from_toml("[llm]\nbackend = \"anthropic\"\n").unwrap_err();
        assert!(matches!(err, crate::ConfigError::Parse(_)));
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut base = SleuthConfig::from_toml(
            r#"
[llm]
backend = "gemini"
model = "base-model"

[agent]
max_depth = 2
rate_limit_delay_ms = 1000
"#,
        )
        .unwrap();

        let project = SleuthConfig::from_toml(
            r#"
[llm]
model = "project-model"

[agent]
max_depth = 4

[logging]
directory = "logs"
"#,
        )
        .unwrap();

        base.merge(project);

        let llm = base.llm.as_ref().unwrap();
        assert_eq!(llm.backend, Some(Backend::Gemini));
        assert_eq!(llm.model.as_deref(), Some("project-model"));

        let agent = base.agent.as_ref().unwrap();
        assert_eq!(agent.max_depth, Some(4));
        assert_eq!(agent.rate_limit_delay_ms, Some(1000));

        assert!(base.logging.is_some());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Gemini".parse::<Backend>().unwrap(), Backend::Gemini);
        assert_eq!("ollama".parse::<Backend>().unwrap(), Backend::Ollama);
        let err = "claude".parse::<Backend>().unwrap_err();
        assert!(err.to_string().contains("unknown backend 'claude'"));
    }

    #[test]
    fn test_backend_env_vars() {
        assert_eq!(Backend::Gemini.env_var(), Some("GEMINI_API_KEY"));
        assert_eq!(Backend::Groq.env_var(), Some("GROQ_API_KEY"));
        assert_eq!(Backend::Ollama.env_var(), None);
    }
}
