//! OpenAI-compatible chat-completions backend.
//!
//! One implementation covers OpenAI, Groq and a local Ollama server; they
//! differ only in base URL, key and timeout. Tool calls travel as
//! `tool_calls` on assistant messages and each answer is a separate
//! `role: "tool"` message.

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason, Usage};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const OLLAMA_BASE: &str = "http://localhost:11434/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Local inference is slow.
const OLLAMA_TIMEOUT: Duration = Duration::from_secs(600);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for [`OpenAiBackend`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Overrides the model named in each request when set.
    pub model: Option<String>,
    pub timeout: Duration,
    /// Retries for transient errors. Zero disables retrying.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Provider label used in logs and [`LlmBackend::name`].
    pub name: String,
}

impl OpenAiConfig {
    fn preset(name: &str, base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.to_string(),
            model: None,
            timeout,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            name: name.to_string(),
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::preset("openai", OPENAI_BASE, Some(api_key.into()), DEFAULT_TIMEOUT)
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::preset("groq", GROQ_BASE, Some(api_key.into()), DEFAULT_TIMEOUT)
    }

    /// Local Ollama server, no key.
    pub fn ollama() -> Self {
        Self::preset("ollama", OLLAMA_BASE, None, OLLAMA_TIMEOUT)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Build the chat-completions body for `request`.
    fn build_body(&self, request: &CompletionRequest) -> Result<ChatBody> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::System {
                content: system.clone(),
            });
        }
        for message in &request.messages {
            append_message(&mut messages, message)?;
        }

        let tools = request
            .tools
            .iter()
            .map(|t| ChatTool {
                kind: "function",
                function: FunctionSpec {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect();

        Ok(ChatBody {
            model: self.config.model.clone().unwrap_or_else(|| request.model.clone()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
        })
    }

    async fn error_from(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimit(RateLimitInfo::from_header(message, retry_after.as_deref())),
            500..=599 => LlmError::Backend(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

/// Flatten one neutral message into chat messages. A tool-result turn
/// becomes one `tool` message per result.
fn append_message(out: &mut Vec<ChatMessage>, message: &Message) -> Result<()> {
    let mut text = String::new();
    let mut calls = Vec::new();

    for block in &message.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => calls.push(WireToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: WireFunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input)?,
                },
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => out.push(ChatMessage::Tool {
                tool_call_id: tool_use_id.clone(),
                content: content.clone(),
            }),
        }
    }

    match message.role {
        Role::Assistant => out.push(ChatMessage::Assistant {
            content: (!text.is_empty() || calls.is_empty()).then_some(text),
            tool_calls: calls,
        }),
        Role::User if !text.is_empty() => out.push(ChatMessage::User { content: text }),
        Role::User => {}
    }
    Ok(())
}

fn stop_reason_from(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::Safety,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(&request)?;
        let url = self.completions_url();

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat-completions request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let mut builder = self.client.post(&url).json(&body);
                if let Some(key) = &self.config.api_key {
                    builder = builder.bearer_auth(key);
                }
                let response = builder.send().await?;

                if !response.status().is_success() {
                    return Err(Self::error_from(response).await);
                }

                let text = response.text().await?;
                serde_json::from_str::<ChatReply>(&text)?.into_completion()
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<WireToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec,
}

#[derive(Debug, Serialize)]
struct FunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    id: String,
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

impl ChatReply {
    /// Only the first choice is used.
    fn into_completion(self) -> Result<CompletionResponse> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(LlmError::Backend("response contained no choices".to_string()));
        };

        let mut content = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(ContentBlock::text(text));
        }
        for call in choice.message.tool_calls {
            // Argument-less calls may arrive as "".
            let input = if call.function.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    LlmError::InvalidRequest(format!(
                        "tool call '{}' has malformed arguments: {}",
                        call.function.name, e
                    ))
                })?
            };
            content.push(ContentBlock::tool_use(call.id, call.function.name, input));
        }

        let usage = self
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(CompletionResponse::new(
            self.id,
            self.model,
            content,
            stop_reason_from(choice.finish_reason.as_deref()),
            usage,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolDefinition, ToolResultBlock};
    use serde_json::json;

    fn reply(raw: serde_json::Value) -> Result<CompletionResponse> {
        serde_json::from_value::<ChatReply>(raw).unwrap().into_completion()
    }

    #[test]
    fn test_presets() {
        let config = OpenAiConfig::openai("k");
        assert_eq!(config.base_url, OPENAI_BASE);
        assert_eq!(config.max_retries, 0);

        let config = OpenAiConfig::groq("k");
        assert_eq!(config.base_url, GROQ_BASE);
        assert_eq!(config.name, "groq");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let config = OpenAiConfig::ollama();
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let backend =
            OpenAiBackend::new(OpenAiConfig::openai("k").with_base_url("http://host/v1/")).unwrap();
        assert_eq!(backend.completions_url(), "http://host/v1/chat/completions");
    }

    #[test]
    fn test_body_carries_tool_round_trip() {
        let backend = OpenAiBackend::new(OpenAiConfig::openai("k")).unwrap();
        let request = CompletionRequest::new(
            "gpt-4o",
            vec![
                Message::user("Find the author"),
                Message::assistant_blocks(vec![ContentBlock::tool_use(
                    "call_1",
                    "search_for_keyword",
                    json!({"keyword": "author"}),
                )]),
                Message::tool_results(vec![
                    ToolResultBlock::success("call_1", "[3, 9]"),
                    ToolResultBlock::success("call_2", "[]"),
                ]),
            ],
            256,
        )
        .with_system("You are a document investigator.")
        .with_tools(vec![ToolDefinition::new(
            "search_for_keyword",
            "Search",
            json!({"type": "object"}),
        )]);

        let body = serde_json::to_value(backend.build_body(&request).unwrap()).unwrap();
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0], json!({"role": "system", "content": "You are a document investigator."}));
        assert_eq!(messages[1], json!({"role": "user", "content": "Find the author"}));

        assert_eq!(messages[2]["role"], "assistant");
        assert!(messages[2].get("content").is_none());
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(messages[2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"keyword":"author"}"#
        );

        assert_eq!(messages[3], json!({"role": "tool", "tool_call_id": "call_1", "content": "[3, 9]"}));
        assert_eq!(messages[4]["tool_call_id"], "call_2");

        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_for_keyword");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_body_omits_empty_tools() {
        let backend = OpenAiBackend::new(OpenAiConfig::openai("k")).unwrap();
        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")], 10);
        let body = serde_json::to_value(backend.build_body(&request).unwrap()).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_config_model_overrides_request() {
        let backend = OpenAiBackend::new(OpenAiConfig::openai("k").with_model("gpt-4o-mini")).unwrap();
        let request = CompletionRequest::new("other", vec![Message::user("hi")], 10);
        assert_eq!(backend.build_body(&request).unwrap().model, "gpt-4o-mini");
    }

    #[test]
    fn test_reply_with_tool_calls() {
        let response = reply(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "read_file_lines", "arguments": "{\"start_line\": 10, \"num_lines\": 5}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 40, "completion_tokens": 12}
        }))
        .unwrap();

        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        let calls = response.tool_uses();
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].input["num_lines"], 5);
        assert_eq!(response.usage, Usage::new(40, 12));
    }

    #[test]
    fn test_reply_with_empty_arguments() {
        let response = reply(json!({
            "id": "x",
            "model": "m",
            "choices": [{
                "message": {
                    "tool_calls": [{"id": "c", "function": {"name": "read_file_lines", "arguments": ""}}]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        assert_eq!(response.tool_uses()[0].input, json!({}));
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn test_reply_with_malformed_arguments_is_error() {
        let err = reply(json!({
            "id": "x",
            "model": "m",
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "c",
                        "type": "function",
                        "function": {"name": "read_file_lines", "arguments": "{not json"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn test_reply_without_choices_is_error() {
        let err = reply(json!({"id": "x", "model": "m", "choices": []})).unwrap_err();
        assert!(matches!(err, LlmError::Backend(_)));
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(stop_reason_from(Some("stop")), StopReason::EndTurn);
        assert_eq!(stop_reason_from(Some("length")), StopReason::MaxTokens);
        assert_eq!(stop_reason_from(Some("content_filter")), StopReason::Safety);
        assert_eq!(stop_reason_from(None), StopReason::EndTurn);
    }
}
