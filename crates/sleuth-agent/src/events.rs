//! Progress events emitted while an investigation runs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind of progress event, used by front ends to pick a style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// An agent started on a query.
    Running,
    Read,
    Search,
    /// A sub-agent is being spawned.
    Recursion,
    /// Tool-level notices such as unknown function names.
    Tool,
    Complete,
    Neutral,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Read => "read",
            Self::Search => "search",
            Self::Recursion => "recursion",
            Self::Tool => "tool",
            Self::Complete => "complete",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver for progress events. Fire-and-forget.
///
/// Any `Fn(&str, LogCategory)` closure is a sink.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str, category: LogCategory);
}

impl<F> LogSink for F
where
    F: Fn(&str, LogCategory) + Send + Sync,
{
    fn log(&self, message: &str, category: LogCategory) {
        self(message, category)
    }
}

/// A sink shared by an agent and all of its sub-agents.
pub type SharedLogSink = Arc<dyn LogSink>;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub category: LogCategory,
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Categories in emission order.
    pub fn categories(&self) -> Vec<LogCategory> {
        self.events.lock().iter().map(|e| e.category).collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, message: &str, category: LogCategory) {
        self.events.lock().push(LogEvent {
            message: message.to_string(),
            category,
        });
    }
}

/// Three spaces per depth level.
pub(crate) fn indent(depth: u32) -> String {
    "   ".repeat(depth as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink: SharedLogSink = Arc::new(move |msg: &str, cat: LogCategory| {
            captured.lock().push(format!("{}:{}", cat, msg));
        });

        sink.log("hello", LogCategory::Search);
        assert_eq!(seen.lock().as_slice(), ["search:hello".to_string()]);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.log("a", LogCategory::Running);
        sink.log("b", LogCategory::Complete);
        assert_eq!(sink.categories(), vec![LogCategory::Running, LogCategory::Complete]);
        assert_eq!(sink.events()[1].message, "b");
    }

    #[test]
    fn test_category_serde_is_lowercase() {
        let json = serde_json::to_string(&LogCategory::Recursion).unwrap();
        assert_eq!(json, "\"recursion\"");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "      ");
    }
}
