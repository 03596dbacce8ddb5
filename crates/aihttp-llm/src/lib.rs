//! Multi-provider AI completion client
//!
//! One request/response contract over five vendor protocols (`OpenAI`,
//! Anthropic, Google Gemini, Grok and `OpenRouter`), with Server-Sent-Event
//! streaming and tool call extraction.
//!
//! Numeric generation parameters are clamped into each provider's accepted
//! range instead of being rejected, so one request can be sent to any
//! provider unchanged. This layer performs no retries; see
//! [`LlmError::is_retryable`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod client;
pub mod convert;
pub mod error;
pub mod events;
pub mod protocol;
pub mod provider;
pub mod sse;
pub mod tools;
pub mod transport;
pub mod types;

pub use aihttp_config::{LlmConfig, ProviderConfig, ProviderKind};
pub use client::{LlmClient, ProviderRegistry};
pub use error::{LlmError, TransportErrorKind};
pub use events::{ErrorEvent, ErrorListener, TracingErrorListener};
pub use provider::{ConnectionTest, Provider, ProviderCapabilities};
pub use tools::{ToolCallAccumulator, ToolRegistry};
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    CompletionParams, CompletionRequest, CompletionResponse, Content, ContentPart, FileRef, FileSource, FinishReason,
    Message, Role, StreamChunk, ToolCall, ToolCallDelta, ToolChoice, ToolDefinition, Usage,
};
