//! Configuration error types.

use thiserror::Error;

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during config loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// API key required but not found anywhere.
    #[error("No API key for {backend}: set {env_var} or add api_key to [llm]")]
    ApiKeyNotFound { backend: String, env_var: String },

    /// A `.env` file exists but could not be read or parsed.
    #[error("Failed to load {path}: {source}")]
    Dotenv {
        path: String,
        #[source]
        source: dotenvy::Error,
    },

    /// A value parsed but is out of range.
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}
