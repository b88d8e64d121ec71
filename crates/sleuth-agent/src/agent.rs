//! The recursive investigation loop.
//!
//! A [`RecursiveAgent`] answers a question about a document it cannot see in
//! full. The model navigates with `search_for_keyword` and `read_file_lines`
//! and may hand a text chunk to a fresh sub-agent with `delegate_subtask`.
//! Sub-agents run one level deeper over a chunk-backed [`Environment`] and
//! share the parent's backend, configuration and log sink.
//!
//! Every run returns a string. Model failures become `Error: <message>`, and
//! a run past `max_depth` returns [`MAX_DEPTH_MESSAGE`] without touching the
//! model, so a failing sub-agent reaches its parent as an ordinary tool result.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use sleuth_llm::{
    ChatSession, DEFAULT_GEMINI_MODEL, FunctionHandler, ModelReply, SharedBackend,
    ToolResultBlock, ToolUseBlock,
};

use crate::environment::Environment;
use crate::error::{AgentError, Result};
use crate::events::{LogCategory, SharedLogSink, indent};
use crate::tools::DocumentTool;

/// Answer returned by a run whose depth exceeds the limit.
pub const MAX_DEPTH_MESSAGE: &str = "Max recursion depth reached. Stopping here.";

pub const DEFAULT_MAX_DEPTH: u32 = 2;

pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_MAX_TOKENS: u32 = 8192;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How tool calls are driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallingMode {
    /// The agent runs the call/result loop itself.
    #[default]
    Manual,
    /// The chat session resolves calls through a handler.
    Automatic,
}

/// Settings shared by an agent and every sub-agent it spawns.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    /// Deepest depth allowed to run. The top-level run is depth 0.
    pub max_depth: u32,
    /// Pause before each delegation.
    pub rate_limit_delay: Duration,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub mode: ToolCallingMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            mode: ToolCallingMode::Manual,
        }
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_mode(mut self, mode: ToolCallingMode) -> Self {
        self.mode = mode;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recursive Agent
// ─────────────────────────────────────────────────────────────────────────────

/// An investigator bound to one document.
pub struct RecursiveAgent {
    backend: SharedBackend,
    environment: Environment,
    config: AgentConfig,
    log_sink: Option<SharedLogSink>,
}

impl RecursiveAgent {
    pub fn new(backend: SharedBackend, environment: Environment, config: AgentConfig) -> Self {
        Self {
            backend,
            environment,
            config,
            log_sink: None,
        }
    }

    /// Send progress events to `sink`. Sub-agents inherit it.
    pub fn with_log_sink(mut self, sink: SharedLogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Investigate `query` as the top-level agent.
    pub async fn run(&self, query: &str) -> String {
        self.run_at_depth(query, 0).await
    }

    /// Investigate `query` at a given recursion depth.
    ///
    /// Never fails: errors are folded into the returned text.
    pub fn run_at_depth<'a>(&'a self, query: &'a str, depth: u32) -> BoxFuture<'a, String> {
        Box::pin(async move {
            if depth > self.config.max_depth {
                tracing::warn!(depth, max_depth = self.config.max_depth, "Recursion limit reached");
                return MAX_DEPTH_MESSAGE.to_string();
            }

            let started = Instant::now();
            tracing::info!(
                depth,
                mode = ?self.config.mode,
                document = %self.environment.metadata(),
                query_len = query.len(),
                "Investigation started"
            );
            self.emit(
                depth,
                LogCategory::Running,
                format!("[Depth {}] Agent activated: {}", depth, query),
            );

            match self.investigate(query, depth).await {
                Ok(answer) => {
                    self.emit(
                        depth,
                        LogCategory::Complete,
                        format!("[Depth {}] Task complete.", depth),
                    );
                    tracing::info!(
                        depth,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        answer_len = answer.len(),
                        "Investigation completed"
                    );
                    answer
                }
                Err(e) => {
                    tracing::warn!(depth, error = %e, "Investigation failed");
                    format!("Error: {}", e)
                }
            }
        })
    }

    async fn investigate(&self, query: &str, depth: u32) -> Result<String> {
        let mut session = ChatSession::new(self.backend.clone(), self.config.model.clone())
            .with_system(system_directive(&self.environment.metadata()))
            .with_tools(DocumentTool::definitions())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        match self.config.mode {
            ToolCallingMode::Manual => self.drive_manually(&mut session, query, depth).await,
            ToolCallingMode::Automatic => {
                let handler = Dispatcher { agent: self, depth };
                session.send_with_auto_calls(query, &handler).await
            }
        }
    }

    async fn drive_manually(
        &self,
        session: &mut ChatSession,
        query: &str,
        depth: u32,
    ) -> Result<String> {
        let mut reply = session.send(query).await?;
        let mut rounds = 0u32;

        loop {
            match reply {
                ModelReply::Text(answer) => {
                    tracing::debug!(depth, rounds, "Model answered");
                    return Ok(answer);
                }
                ModelReply::ToolCalls(calls) => {
                    rounds += 1;
                    tracing::debug!(
                        depth,
                        round = rounds,
                        tools = %calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
                        "Executing tool calls"
                    );

                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let output = self.dispatch(call, depth).await?;
                        results.push(ToolResultBlock::success(call.id.clone(), output));
                    }
                    reply = session.send_tool_results(results).await?;
                }
            }
        }
    }

    /// Execute one tool call against this agent's document.
    async fn dispatch(&self, call: &ToolUseBlock, depth: u32) -> Result<String> {
        let tool = DocumentTool::parse(&call.name, &call.input)?;

        let output = match tool {
            DocumentTool::ReadFileLines {
                start_line,
                num_lines,
            } => {
                self.emit(
                    depth,
                    LogCategory::Read,
                    format!(
                        "Reading lines {} to {}",
                        start_line,
                        start_line.saturating_add(num_lines)
                    ),
                );
                self.environment.read_window(start_line, num_lines)
            }
            DocumentTool::SearchForKeyword { keyword } => {
                let hits = self.environment.keyword_search(&keyword);
                self.emit(
                    depth,
                    LogCategory::Search,
                    format!("Searching for '{}' ({} matches)", keyword, hits.len()),
                );
                format!("{:?}", hits)
            }
            DocumentTool::DelegateSubtask {
                sub_question,
                context_chunk,
            } => self.delegate(&sub_question, &context_chunk, depth).await,
            DocumentTool::Unknown { name } => {
                let message = format!("Unknown function: {}", name);
                self.emit(depth, LogCategory::Tool, message.clone());
                message
            }
        };

        tracing::debug!(
            depth,
            tool = %call.name,
            call_id = %call.id,
            output_bytes = output.len(),
            "Tool call completed"
        );
        Ok(output)
    }

    /// Run a sub-agent over `context_chunk` one level deeper.
    async fn delegate(&self, sub_question: &str, context_chunk: &str, depth: u32) -> String {
        self.emit(
            depth,
            LogCategory::Recursion,
            format!("[Recursion] Spawning sub-agent for: '{}'", sub_question),
        );

        if !self.config.rate_limit_delay.is_zero() {
            tokio::time::sleep(self.config.rate_limit_delay).await;
        }

        let child = RecursiveAgent {
            backend: self.backend.clone(),
            environment: Environment::from_chunk(context_chunk),
            config: self.config.clone(),
            log_sink: self.log_sink.clone(),
        };
        child.run_at_depth(sub_question, depth + 1).await
    }

    fn emit(&self, depth: u32, category: LogCategory, message: String) {
        tracing::debug!(depth, %category, "{}", message);
        if let Some(sink) = &self.log_sink {
            sink.log(&format!("{}{}", indent(depth), message), category);
        }
    }
}

impl std::fmt::Debug for RecursiveAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveAgent")
            .field("backend", &self.backend.name())
            .field("environment", &self.environment.metadata())
            .field("config", &self.config)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Routes automatic-mode calls through the same dispatcher as the manual loop.
struct Dispatcher<'a> {
    agent: &'a RecursiveAgent,
    depth: u32,
}

#[async_trait]
impl<'a> FunctionHandler for Dispatcher<'a> {
    type Error = AgentError;

    async fn call(&self, call: &ToolUseBlock) -> Result<String> {
        self.agent.dispatch(call, self.depth).await
    }
}

fn system_directive(metadata: &str) -> String {
    format!(
        "You are a Recursive Document Investigator. \
         You cannot see the full document. You must use tools to navigate it. \
         Document info: {}. \
         Use 'search_for_keyword' to find locations, 'read_file_lines' to see text, \
         and 'delegate_subtask' if you need deep analysis of a specific section.",
        metadata
    )
}
