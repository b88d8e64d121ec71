//! Flatten a layered [`SleuthConfig`] plus CLI overrides into the explicit
//! settings handed to backend and agent construction.

use std::time::Duration;

use crate::secrets::{ResolvedSecret, resolve_api_key};
use crate::{AgentSection, Backend, ConfigError, LlmConfig, Result, SleuthConfig, ToolMode};

pub const DEFAULT_MAX_DEPTH: u32 = 2;
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Values given on the command line. `None` leaves the config value in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub model: Option<String>,
    pub max_depth: Option<u32>,
    pub rate_limit_delay_ms: Option<u64>,
    pub mode: Option<ToolMode>,
}

/// Fully resolved settings with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub backend: Backend,
    /// `None` only for backends that need no key.
    pub api_key: Option<ResolvedSecret>,
    pub model_name: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry_max: u32,
    pub retry_backoff: Duration,
    pub max_depth: u32,
    pub rate_limit_delay: Duration,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub mode: ToolMode,
}

impl ResolvedSettings {
    /// Resolve settings, requiring an API key for backends that use one.
    pub fn resolve(config: &SleuthConfig, overrides: &Overrides) -> Result<Self> {
        let llm = config.llm.clone().unwrap_or_default();
        let agent = config.agent.clone().unwrap_or_default();

        let backend = overrides.backend.or(llm.backend).unwrap_or_default();
        let api_key = resolve_api_key(&backend, llm.api_key.as_deref());
        if api_key.is_none()
            && let Some(env_var) = backend.env_var()
        {
            return Err(ConfigError::ApiKeyNotFound {
                backend: backend.display_name().to_string(),
                env_var: env_var.to_string(),
            });
        }

        let settings = Self::assemble(backend, api_key, &llm, &agent, overrides)?;
        tracing::debug!(
            backend = %settings.backend,
            model = %settings.model_name,
            max_depth = settings.max_depth,
            key_source = settings.api_key.as_ref().map(|k| k.source.to_string()),
            "Settings resolved"
        );
        Ok(settings)
    }

    fn assemble(
        backend: Backend,
        api_key: Option<ResolvedSecret>,
        llm: &LlmConfig,
        agent: &AgentSection,
        overrides: &Overrides,
    ) -> Result<Self> {
        // A model chosen for a different backend is meaningless once the
        // backend is overridden on the command line.
        let backend_switched = overrides.backend.is_some() && overrides.backend != llm.backend;
        let model_name = overrides
            .model
            .clone()
            .or_else(|| llm.model.clone().filter(|_| !backend_switched))
            .unwrap_or_else(|| backend.default_model().to_string());

        let max_tokens = agent.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::invalid("agent.max_tokens", "must be positive"));
        }
        if let Some(t) = agent.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::invalid(
                "agent.temperature",
                format!("{} is outside 0.0..=2.0", t),
            ));
        }

        Ok(Self {
            backend,
            api_key,
            model_name,
            base_url: llm.base_url.clone().filter(|_| !backend_switched),
            timeout: Duration::from_secs(llm.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            retry_max: llm.retry_max.unwrap_or(0),
            retry_backoff: Duration::from_millis(
                llm.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            ),
            max_depth: overrides
                .max_depth
                .or(agent.max_depth)
                .unwrap_or(DEFAULT_MAX_DEPTH),
            rate_limit_delay: Duration::from_millis(
                overrides
                    .rate_limit_delay_ms
                    .or(agent.rate_limit_delay_ms)
                    .unwrap_or(DEFAULT_RATE_LIMIT_DELAY_MS),
            ),
            max_tokens,
            temperature: agent.temperature,
            mode: overrides.mode.or(agent.mode).unwrap_or_default(),
        })
    }

    /// The API key value, if any.
    pub fn api_key_value(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretSource;
    use serial_test::serial;

    fn config(toml: &str) -> SleuthConfig {
        SleuthConfig::from_toml(toml).unwrap()
    }

    #[test]
    #[serial]
    fn test_defaults() {
        unsafe { std::env::set_var("GEMINI_API_KEY", "g-key") };
        let settings = ResolvedSettings::resolve(&SleuthConfig::new(), &Overrides::default());
        unsafe { std::env::remove_var("GEMINI_API_KEY") };
        let settings = settings.unwrap();

        assert_eq!(settings.backend, Backend::Gemini);
        assert_eq!(settings.api_key_value(), Some("g-key"));
        assert_eq!(settings.model_name, "gemini-2.5-flash");
        assert_eq!(settings.max_depth, 2);
        assert_eq!(settings.rate_limit_delay, Duration::from_secs(1));
        assert_eq!(settings.max_tokens, 8192);
        assert_eq!(settings.retry_max, 0);
        assert_eq!(settings.timeout, Duration::from_secs(300));
        assert_eq!(settings.mode, ToolMode::Manual);
        assert!(settings.temperature.is_none());
    }

    #[test]
    #[serial]
    fn test_missing_key_is_error() {
        unsafe { std::env::remove_var("GEMINI_API_KEY") };
        let err = ResolvedSettings::resolve(&SleuthConfig::new(), &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ApiKeyNotFound { .. }));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_ollama_resolves_without_key() {
        let settings = ResolvedSettings::resolve(
            &config("[llm]\nbackend = \"ollama\"\n"),
            &Overrides::default(),
        )
        .unwrap();
        assert!(settings.api_key.is_none());
        assert_eq!(settings.model_name, "llama3.2");
    }

    #[test]
    #[serial]
    fn test_cli_overrides_win() {
        unsafe { std::env::remove_var("GROQ_API_KEY") };
        let cfg = config(
            r#"
[llm]
backend = "groq"
model = "config-model"
api_key = "gsk-config"

[agent]
max_depth = 5
rate_limit_delay_ms = 2000
mode = "automatic"
"#,
        );
        let overrides = Overrides {
            model: Some("cli-model".to_string()),
            max_depth: Some(1),
            rate_limit_delay_ms: Some(0),
            mode: Some(ToolMode::Manual),
            ..Default::default()
        };

        let settings = ResolvedSettings::resolve(&cfg, &overrides).unwrap();
        assert_eq!(settings.backend, Backend::Groq);
        assert_eq!(settings.model_name, "cli-model");
        assert_eq!(settings.max_depth, 1);
        assert_eq!(settings.rate_limit_delay, Duration::ZERO);
        assert_eq!(settings.mode, ToolMode::Manual);
        assert_eq!(settings.api_key.unwrap().source, SecretSource::ConfigFile);
    }

    #[test]
    fn test_backend_override_drops_config_model() {
        let cfg = config("[llm]\nbackend = \"openai\"\nmodel = \"gpt-4o\"\nbase_url = \"http://proxy\"\n");
        let overrides = Overrides {
            backend: Some(Backend::Ollama),
            ..Default::default()
        };

        let settings = ResolvedSettings::resolve(&cfg, &overrides).unwrap();
        assert_eq!(settings.model_name, "llama3.2");
        assert!(settings.base_url.is_none());
    }

    #[test]
    fn test_invalid_temperature() {
        let cfg = config("[llm]\nbackend = \"ollama\"\n\n[agent]\ntemperature = 3.5\n");
        let err = ResolvedSettings::resolve(&cfg, &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("agent.temperature"));
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let cfg = config("[llm]\nbackend = \"ollama\"\n\n[agent]\nmax_tokens = 0\n");
        let err = ResolvedSettings::resolve(&cfg, &Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
