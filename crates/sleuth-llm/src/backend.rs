//! The `LlmBackend` trait and a scripted mock for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Run `f` with exponential backoff on transient failures.
///
/// `max_retries = 0` means a single attempt. Non-retryable errors return
/// immediately. A rate-limit `retry_after` hint overrides the backoff for
/// that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A model service that can answer a [`CompletionRequest`].
///
/// Backends are expected to support native function calling: tool
/// declarations travel in `request.tools` and calls come back as
/// `ToolUse` content blocks.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute one completion round trip.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// A backend that can be shared across agents and depths.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted outcome for [`MockBackend`].
#[derive(Debug)]
pub enum MockResponse {
    Response(CompletionResponse),
    Error(LlmError),
}

impl From<CompletionResponse> for MockResponse {
    fn from(response: CompletionResponse) -> Self {
        MockResponse::Response(response)
    }
}

/// A backend that replays scripted responses in order.
///
/// Every request is recorded so tests can inspect what the agent sent.
/// Running out of script is a backend error.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<MockResponse>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::scripted(responses.into_iter().map(MockResponse::from).collect())
    }

    /// Script a mix of successes and failures.
    pub fn scripted(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses.into()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// A backend that answers once with plain text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::new(
            "mock_msg_1",
            "mock-model",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::new(10, 20),
        )])
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }

    /// Scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.request_log.lock().push(request);

        match self.responses.lock().pop_front() {
            Some(MockResponse::Response(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            None => Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
