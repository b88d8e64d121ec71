//! Error types for the agent crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Failure to build an [`Environment`](crate::Environment).
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for one agent run.
///
/// None of these escape [`RecursiveAgent::run`](crate::RecursiveAgent::run);
/// they are rendered into its `Error: ...` answer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Model-service failure.
    #[error(transparent)]
    Llm(#[from] sleuth_llm::LlmError),

    /// The model called a tool with arguments that do not fit its schema.
    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl AgentError {
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_is_transparent() {
        let err: AgentError = sleuth_llm::LlmError::Network("connection reset".to_string()).into();
        assert_eq!(err.to_string(), "Network error: connection reset");
    }

    #[test]
    fn test_invalid_arguments_display() {
        let err = AgentError::invalid_arguments("read_file_lines", "missing 'num_lines'");
        assert_eq!(
            err.to_string(),
            "Invalid arguments for 'read_file_lines': missing 'num_lines'"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = EnvironmentError::NotFound(PathBuf::from("/tmp/nope.txt"));
        assert_eq!(err.to_string(), "File not found: /tmp/nope.txt");
    }
}
