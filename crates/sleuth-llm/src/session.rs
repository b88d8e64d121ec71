//! Stateful chat sessions over an [`LlmBackend`].
//!
//! A [`ChatSession`] owns the message history of one conversation and turns
//! every backend reply into a [`ModelReply`]: either final text or a batch of
//! function calls that must be answered before the model continues.
//!
//! Two ways to drive it:
//!
//! - **Manual**: call [`ChatSession::send`], execute the returned calls
//!   yourself, hand the answers to [`ChatSession::send_tool_results`], repeat.
//! - **Automatic**: [`ChatSession::send_with_auto_calls`] runs that loop for
//!   you, dispatching each call through a [`FunctionHandler`].

use async_trait::async_trait;

use crate::backend::SharedBackend;
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, Message, ToolDefinition, ToolResultBlock, ToolUseBlock};

const DEFAULT_MAX_TOKENS: u32 = 8192;

/// What the model produced for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// A final answer; the exchange is over.
    Text(String),
    /// Calls to run, in order, before the next turn.
    ToolCalls(Vec<ToolUseBlock>),
}

/// Executes function calls for the automatic mode.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Error type that aborts the exchange. Backend failures must fit in it.
    type Error: From<LlmError> + Send;

    /// Run one call and return the text handed back to the model.
    async fn call(&self, call: &ToolUseBlock) -> std::result::Result<String, Self::Error>;
}

/// One conversation with a model.
pub struct ChatSession {
    backend: SharedBackend,
    model: String,
    system: Option<String>,
    tools: Vec<ToolDefinition>,
    max_tokens: u32,
    temperature: Option<f32>,
    history: Vec<Message>,
    pending: Vec<String>,
}

impl ChatSession {
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            system: None,
            tools: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            history: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
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

    /// Messages exchanged so far.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Ids of calls from the last reply that still need an answer.
    pub fn pending_calls(&self) -> &[String] {
        &self.pending
    }

    /// Send a user message.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<ModelReply> {
        if !self.pending.is_empty() {
            return Err(LlmError::InvalidRequest(format!(
                "{} function call(s) still awaiting results",
                self.pending.len()
            )));
        }
        self.history.push(Message::user(text));
        self.round_trip().await
    }

    /// Answer every call from the previous reply.
    pub async fn send_tool_results(&mut self, results: Vec<ToolResultBlock>) -> Result<ModelReply> {
        let answered: Vec<&str> = results.iter().map(|r| r.tool_use_id.as_str()).collect();
        if answered.len() != self.pending.len()
            || !self.pending.iter().all(|id| answered.contains(&id.as_str()))
        {
            return Err(LlmError::InvalidRequest(format!(
                "expected results for calls {:?}, got {:?}",
                self.pending, answered
            )));
        }

        self.pending.clear();
        self.history.push(Message::tool_results(results));
        self.round_trip().await
    }

    /// Send a user message and resolve every function call through `handler`
    /// until the model answers in text.
    pub async fn send_with_auto_calls<H>(
        &mut self,
        text: impl Into<String>,
        handler: &H,
    ) -> std::result::Result<String, H::Error>
    where
        H: FunctionHandler,
    {
        let mut reply = self.send(text).await?;

        loop {
            match reply {
                ModelReply::Text(answer) => return Ok(answer),
                ModelReply::ToolCalls(calls) => {
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let output = handler.call(call).await?;
                        results.push(ToolResultBlock::success(call.id.clone(), output));
                    }
                    reply = self.send_tool_results(results).await?;
                }
            }
        }
    }

    async fn round_trip(&mut self) -> Result<ModelReply> {
        let mut request = CompletionRequest::new(&self.model, self.history.clone(), self.max_tokens)
            .with_tools(self.tools.clone());
        request.system = self.system.clone();
        request.temperature = self.temperature;

        let response = self.backend.complete(request).await?;

        tracing::debug!(
            backend = self.backend.name(),
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Model turn received"
        );

        let calls = response.tool_uses();
        if !response.content.is_empty() {
            self.history
                .push(Message::assistant_blocks(response.content.clone()));
        }

        if calls.is_empty() {
            return Ok(ModelReply::Text(response.text()));
        }

        self.pending = calls.iter().map(|c| c.id.clone()).collect();
        Ok(ModelReply::ToolCalls(calls))
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("tools", &self.tools.len())
            .field("history", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockResponse};
    use crate::types::{CompletionResponse, ContentBlock, Role, StopReason, Usage};
    use std::sync::Arc;

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse::new(
            "r",
            "mock",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::default(),
        )
    }

    fn call_response(calls: &[(&str, &str, serde_json::Value)]) -> CompletionResponse {
        CompletionResponse::new(
            "r",
            "mock",
            calls
                .iter()
                .map(|(id, name, input)| ContentBlock::tool_use(*id, *name, input.clone()))
                .collect(),
            StopReason::ToolUse,
            Usage::default(),
        )
    }

    #[tokio::test]
    async fn test_send_returns_text() {
        let backend = Arc::new(MockBackend::with_text("done"));
        let mut session = ChatSession::new(backend.clone(), "m").with_system("sys");

        let reply = session.send("hello").await.unwrap();
        assert_eq!(reply, ModelReply::Text("done".to_string()));

        let sent = backend.requests();
        assert_eq!(sent[0].system.as_deref(), Some("sys"));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_manual_tool_round_trip() {
        let backend = Arc::new(MockBackend::new(vec![
            call_response(&[("c1", "search_for_keyword", serde_json::json!({"keyword": "x"}))]),
            text_response("found it"),
        ]));
        let mut session = ChatSession::new(backend.clone(), "m");

        let reply = session.send("look").await.unwrap();
        let ModelReply::ToolCalls(calls) = reply else {
            panic!("expected tool calls");
        };
        assert_eq!(session.pending_calls(), ["c1".to_string()]);

        let reply = session
            .send_tool_results(vec![ToolResultBlock::success(&calls[0].id, "[4]")])
            .await
            .unwrap();
        assert_eq!(reply, ModelReply::Text("found it".to_string()));
        assert!(session.pending_calls().is_empty());

        // user, assistant(call), user(result), assistant(text)
        let second = &backend.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert!(matches!(
            second.messages[1].content[0],
            ContentBlock::ToolUse { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_result_rejected() {
        let backend = Arc::new(MockBackend::new(vec![call_response(&[
            ("a", "read_file_lines", serde_json::json!({})),
            ("b", "read_file_lines", serde_json::json!({})),
        ])]));
        let mut session = ChatSession::new(backend, "m");
        session.send("go").await.unwrap();

        let err = session
            .send_tool_results(vec![ToolResultBlock::success("a", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));

        let err = session.send("again").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    struct Echo;

    #[async_trait]
    impl FunctionHandler for Echo {
        type Error = LlmError;

        async fn call(&self, call: &ToolUseBlock) -> Result<String> {
            Ok(format!("{}:{}", call.name, call.input))
        }
    }

    #[tokio::test]
    async fn test_auto_calls_loop_until_text() {
        let backend = Arc::new(MockBackend::new(vec![
            call_response(&[("a", "one", serde_json::json!({"n": 1}))]),
            call_response(&[("b", "two", serde_json::json!({}))]),
            text_response("all done"),
        ]));
        let mut session = ChatSession::new(backend.clone(), "m");

        let answer = session.send_with_auto_calls("start", &Echo).await.unwrap();
        assert_eq!(answer, "all done");
        assert_eq!(backend.request_count(), 3);

        let last = backend.requests().pop().unwrap();
        let ContentBlock::ToolResult { content, .. } = &last.messages[4].content[0] else {
            panic!("expected tool result");
        };
        assert_eq!(content, "two:{}");
    }

    #[tokio::test]
    async fn test_auto_calls_propagate_backend_error() {
        let backend = Arc::new(MockBackend::scripted(vec![MockResponse::Error(
            LlmError::Network("offline".to_string()),
        )]));
        let mut session = ChatSession::new(backend, "m");

        let err = session.send_with_auto_calls("start", &Echo).await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
    }
}
