//! API key lookup.
//!
//! Resolution order:
//! 1. Environment variable for the backend (a `.env` file counts, see [`load_dotenv`])
//! 2. Config file value (with a warning at load time)

use std::path::{Path, PathBuf};

use crate::{Backend, ConfigError, Result};

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve an API key for a backend.
///
/// Backends without a key variable (Ollama) still honor a configured value.
/// Empty values are treated as unset.
pub fn resolve_api_key(backend: &Backend, config_value: Option<&str>) -> Option<ResolvedSecret> {
    if let Some(env_var) = backend.env_var()
        && let Ok(value) = std::env::var(env_var)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

/// Load `.env` from `dir` (or the working directory) into the process
/// environment. Existing variables are not overwritten and parent
/// directories are not searched.
///
/// Returns the file that was loaded, if any. A missing file is not an error.
pub fn load_dotenv(dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(_) => return Ok(None),
        },
    };
    let path = dir.join(".env");

    match dotenvy::from_path(&path) {
        Ok(()) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(source) => Err(ConfigError::Dotenv {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_var_beats_config_value() {
        unsafe { std::env::set_var("GROQ_API_KEY", "from-env") };
        let secret = resolve_api_key(&Backend::Groq, Some("from-config")).unwrap();
        unsafe { std::env::remove_var("GROQ_API_KEY") };

        assert_eq!(secret.value, "from-env");
        assert_eq!(secret.source, SecretSource::EnvVar("GROQ_API_KEY".to_string()));
    }

    #[test]
    #[serial]
    fn test_config_value_is_fallback() {
        unsafe { std::env::remove_var("OPENAI_API_KEY") };
        let secret = resolve_api_key(&Backend::Openai, Some("sk-config")).unwrap();
        assert_eq!(secret.value, "sk-config");
        assert_eq!(secret.source, SecretSource::ConfigFile);
    }

    #[test]
    #[serial]
    fn test_empty_env_var_is_ignored() {
        unsafe { std::env::set_var("GEMINI_API_KEY", "") };
        let secret = resolve_api_key(&Backend::Gemini, None);
        unsafe { std::env::remove_var("GEMINI_API_KEY") };
        assert!(secret.is_none());
    }

    #[test]
    fn test_ollama_needs_no_env_var() {
        assert!(resolve_api_key(&Backend::Ollama, None).is_none());
        let secret = resolve_api_key(&Backend::Ollama, Some("token")).unwrap();
        assert_eq!(secret.source, SecretSource::ConfigFile);
    }

    #[test]
    #[serial]
    fn test_load_dotenv_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "SLEUTH_TEST_DOTENV=loaded\n").unwrap();
        unsafe { std::env::remove_var("SLEUTH_TEST_DOTENV") };

        let path = load_dotenv(Some(dir.path())).unwrap().unwrap();
        assert!(path.ends_with(".env"));
        assert_eq!(std::env::var("SLEUTH_TEST_DOTENV").unwrap(), "loaded");

        unsafe { std::env::remove_var("SLEUTH_TEST_DOTENV") };
    }

    #[test]
    fn test_load_dotenv_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dotenv(Some(dir.path())).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn test_load_dotenv_ignores_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "SLEUTH_TEST_PARENT_DOTENV=leaked\n").unwrap();
        let child = dir.path().join("work");
        std::fs::create_dir(&child).unwrap();
        unsafe { std::env::remove_var("SLEUTH_TEST_PARENT_DOTENV") };

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(&child).unwrap();
        let loaded = load_dotenv(None);
        std::env::set_current_dir(previous).unwrap();

        assert!(loaded.unwrap().is_none());
        assert!(std::env::var("SLEUTH_TEST_PARENT_DOTENV").is_err());
    }

    #[test]
    fn test_load_dotenv_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "NOT A VALID LINE\n").unwrap();
        let err = load_dotenv(Some(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Dotenv { .. }));
    }
}
