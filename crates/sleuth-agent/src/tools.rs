//! The three document tools offered to the model.
//!
//! Tool calls arrive as a name plus a JSON argument object. [`DocumentTool`]
//! parses them into a closed set of variants so dispatch is an exhaustive
//! `match`; names outside the set land in [`DocumentTool::Unknown`] instead of
//! failing.

use serde_json::{Value, json};
use sleuth_llm::ToolDefinition;

use crate::error::{AgentError, Result};

pub const READ_FILE_LINES: &str = "read_file_lines";
pub const SEARCH_FOR_KEYWORD: &str = "search_for_keyword";
pub const DELEGATE_SUBTASK: &str = "delegate_subtask";

/// A parsed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentTool {
    ReadFileLines { start_line: i64, num_lines: i64 },
    SearchForKeyword { keyword: String },
    DelegateSubtask { sub_question: String, context_chunk: String },
    Unknown { name: String },
}

impl DocumentTool {
    /// Parse a call by name. Fails only when a known tool gets arguments it
    /// cannot use.
    pub fn parse(name: &str, input: &Value) -> Result<Self> {
        let tool = match name {
            READ_FILE_LINES => Self::ReadFileLines {
                start_line: required_int(name, input, "start_line")?,
                num_lines: required_int(name, input, "num_lines")?,
            },
            SEARCH_FOR_KEYWORD => Self::SearchForKeyword {
                keyword: required_string(name, input, "keyword")?,
            },
            DELEGATE_SUBTASK => Self::DelegateSubtask {
                sub_question: required_string(name, input, "sub_question")?,
                context_chunk: required_string(name, input, "context_chunk")?,
            },
            other => Self::Unknown {
                name: other.to_string(),
            },
        };
        Ok(tool)
    }

    /// The tool name as the model knows it.
    pub fn name(&self) -> &str {
        match self {
            Self::ReadFileLines { .. } => READ_FILE_LINES,
            Self::SearchForKeyword { .. } => SEARCH_FOR_KEYWORD,
            Self::DelegateSubtask { .. } => DELEGATE_SUBTASK,
            Self::Unknown { name } => name,
        }
    }

    /// Declarations for the three known tools.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                READ_FILE_LINES,
                "Reads specific lines from the file to inspect content.",
                json!({
                    "type": "object",
                    "properties": {
                        "start_line": {
                            "type": "integer",
                            "description": "0-based index of the first line to read"
                        },
                        "num_lines": {
                            "type": "integer",
                            "description": "How many lines to read"
                        }
                    },
                    "required": ["start_line", "num_lines"]
                }),
            ),
            ToolDefinition::new(
                SEARCH_FOR_KEYWORD,
                "Finds line numbers containing a keyword (case-insensitive, at most 50).",
                json!({
                    "type": "object",
                    "properties": {
                        "keyword": {
                            "type": "string",
                            "description": "Text to look for"
                        }
                    },
                    "required": ["keyword"]
                }),
            ),
            ToolDefinition::new(
                DELEGATE_SUBTASK,
                "Spawns a sub-agent to analyze a specific text chunk. \
                 Useful when you find complex data that needs focused analysis.",
                json!({
                    "type": "object",
                    "properties": {
                        "sub_question": {
                            "type": "string",
                            "description": "The question the sub-agent should answer"
                        },
                        "context_chunk": {
                            "type": "string",
                            "description": "The exact text the sub-agent will investigate"
                        }
                    },
                    "required": ["sub_question", "context_chunk"]
                }),
            ),
        ]
    }
}

/// Integers may arrive as JSON integers, floats (truncated) or numeric strings.
fn required_int(tool: &str, input: &Value, field: &str) -> Result<i64> {
    let value = input
        .get(field)
        .ok_or_else(|| AgentError::invalid_arguments(tool, format!("missing '{}'", field)))?;

    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        AgentError::invalid_arguments(
            tool,
            format!("'{}' must be an integer, got {}", field, value),
        )
    })
}

fn required_string(tool: &str, input: &Value, field: &str) -> Result<String> {
    match input.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(AgentError::invalid_arguments(
            tool,
            format!("'{}' must be a string, got {}", field, other),
        )),
        None => Err(AgentError::invalid_arguments(
            tool,
            format!("missing '{}'", field),
        )),
    }
}
