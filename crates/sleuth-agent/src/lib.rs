//! Recursive document investigation.
//!
//! This crate pairs a line-indexed [`Environment`] with a [`RecursiveAgent`]
//! that lets a model explore it through three tools:
//!
//! - `read_file_lines`: a window of numbered lines
//! - `search_for_keyword`: indices of matching lines
//! - `delegate_subtask`: a sub-agent over a text chunk, one level deeper
//!
//! Progress is reported through an optional [`LogSink`].

pub mod agent;
pub mod environment;
pub mod error;
pub mod events;
pub mod tools;

pub use agent::{
    AgentConfig, DEFAULT_MAX_DEPTH, DEFAULT_RATE_LIMIT_DELAY, MAX_DEPTH_MESSAGE, RecursiveAgent,
    ToolCallingMode,
};
pub use environment::{DocumentOrigin, Environment, KEYWORD_SEARCH_LIMIT};
pub use error::{AgentError, EnvironmentError, Result};
pub use events::{LogCategory, LogEvent, LogSink, RecordingSink, SharedLogSink};
pub use tools::DocumentTool;
