//! Model-service abstraction for Sleuth.
//!
//! The core abstraction is the [`LlmBackend`] trait; [`ChatSession`] layers a
//! conversation with function calling on top of any backend.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ChatSession                            │
//! │  - send() -> Text | ToolCalls           │
//! │  - send_with_auto_calls(handler)        │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │  LlmBackend trait                       │
//! │  - complete() -> Response               │
//! └─────────────────────────────────────────┘
//!                    │
//!     ┌──────────────┼──────────────┐
//!     ▼              ▼              ▼
//! ┌────────┐   ┌──────────┐   ┌────────┐
//! │ Gemini │   │  OpenAI  │   │  Mock  │
//! └────────┘   └──────────┘   └────────┘
//! ```

pub mod backend;
pub mod error;
pub mod session;
pub mod types;

// Provider implementations
pub mod gemini;
pub mod openai;

pub use backend::{LlmBackend, MockBackend, MockResponse, SharedBackend, with_retry};
pub use error::{LlmError, RateLimitInfo, Result};
pub use session::{ChatSession, FunctionHandler, ModelReply};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolResultBlock, ToolUseBlock, Usage,
};

pub use gemini::{DEFAULT_GEMINI_MODEL, GeminiBackend, GeminiConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};
