//! Google Gemini backend (`generateContent` REST API).
//!
//! Gemini has no call ids: a `functionResponse` is matched to its
//! `functionCall` by name and position. Ids are synthesized on the way in
//! and resolved back to names on the way out.

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, Role, StopReason, Usage};

/// Default Generative Language API base URL.
const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when neither config nor request names one.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for [`GeminiBackend`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Overrides the model named in each request when set.
    pub model: Option<String>,
    pub timeout: Duration,
    /// Retries for transient errors. Zero disables retrying.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
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
// Gemini Backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("Gemini API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn resolve_model(&self, request: &CompletionRequest) -> String {
        self.config
            .model
            .clone()
            .or_else(|| (!request.model.is_empty()).then(|| request.model.clone()))
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string())
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Convert a neutral request into a `generateContent` body.
    fn to_gemini_request(request: &CompletionRequest) -> Result<GeminiRequest> {
        // Tool results carry ids; Gemini wants the function name.
        let mut call_names: HashMap<&str, &str> = HashMap::new();
        let mut contents = Vec::with_capacity(request.messages.len());

        for message in &request.messages {
            let mut parts = Vec::with_capacity(message.content.len());

            for block in &message.content {
                match block {
                    ContentBlock::Text { text } if text.is_empty() => {}
                    ContentBlock::Text { text } => parts.push(GeminiPart::text(text.clone())),
                    ContentBlock::ToolUse { id, name, input } => {
                        call_names.insert(id.as_str(), name.as_str());
                        parts.push(GeminiPart {
                            function_call: Some(GeminiFunctionCall {
                                name: name.clone(),
                                args: input.clone(),
                            }),
                            ..Default::default()
                        });
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        let name = call_names.get(tool_use_id.as_str()).ok_or_else(|| {
                            LlmError::InvalidRequest(format!(
                                "tool result '{}' does not answer any earlier call",
                                tool_use_id
                            ))
                        })?;
                        parts.push(GeminiPart {
                            function_response: Some(GeminiFunctionResponse {
                                name: (*name).to_string(),
                                response: serde_json::json!({ "result": content }),
                            }),
                            ..Default::default()
                        });
                    }
                }
            }

            if parts.is_empty() {
                continue;
            }

            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts,
            });
        }

        let system_instruction = request.system.as_ref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(text.clone())],
        });

        let tools = (!request.tools.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    })
                    .collect(),
            }]
        });

        Ok(GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: Some(request.max_tokens),
                temperature: request.temperature,
            }),
        })
    }

    fn from_gemini_response(resp: GeminiResponse, model: &str) -> Result<CompletionResponse> {
        let candidate = resp.candidates.into_iter().next().ok_or_else(|| {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            LlmError::Backend(format!("Gemini returned no answer: {}", reason))
        })?;

        let mut content = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = part.function_call {
                let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                let args = if call.args.is_null() {
                    serde_json::json!({})
                } else {
                    call.args
                };
                content.push(ContentBlock::tool_use(id, call.name, args));
            } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                content.push(ContentBlock::text(text));
            }
        }

        let has_calls = content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
        let stop_reason = if has_calls {
            StopReason::ToolUse
        } else {
            match candidate.finish_reason.as_deref() {
                Some("MAX_TOKENS") => StopReason::MaxTokens,
                Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") => {
                    StopReason::Safety
                }
                _ => StopReason::EndTurn,
            }
        };

        let usage = resp
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        Ok(CompletionResponse::new(
            resp.response_id
                .unwrap_or_else(|| format!("gemini-{}", uuid::Uuid::new_v4().simple())),
            resp.model_version.unwrap_or_else(|| model.to_string()),
            content,
            stop_reason,
            usage,
        ))
    }

    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<GeminiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimit(RateLimitInfo::from_header(
                message,
                retry_after.as_deref(),
            )),
            400 | 404 => LlmError::InvalidRequest(message),
            500..=599 => LlmError::Backend(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = self.resolve_model(&request);
        let body = Self::to_gemini_request(&request)?;
        let url = self.generate_url(&model);

        tracing::debug!(
            backend = "gemini",
            %model,
            contents = body.contents.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "gemini",
            || async {
                let response = self
                    .client
                    .post(&url)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-goog-api-key", &self.config.api_key)
                    .json(&body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(Self::handle_error_response(response).await);
                }

                let text = response.text().await?;
                let parsed: GeminiResponse = serde_json::from_str(&text)?;
                Self::from_gemini_response(parsed, &model)
            },
        )
        .await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    model_version: Option<String>,
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
