use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::tool::{ToolChoice, ToolDefinition};
use crate::error::LlmError;

/// Parameters controlling text generation
///
/// Values outside a provider's accepted range are clamped silently when the
/// request is normalized (Anthropic temperature 1.5 becomes 1.0, `OpenAI`
/// temperature 3.0 becomes 2.0). Parameters a provider does not support
/// are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling (Anthropic and Gemini only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Vendor-neutral completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier; the provider's default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Generation parameters
    #[serde(default)]
    pub params: CompletionParams,
    /// Tool definitions available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Deadline for this request, overriding the provider timeout
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    /// Create a request from messages with default parameters
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            messages,
            params: CompletionParams::default(),
            tools: None,
            tool_choice: None,
            stream: false,
            timeout: None,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.params.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of generated tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = Some(max_tokens);
        self
    }

    /// Attach tool definitions
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }

    /// Set the tool choice
    #[must_use]
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Set a per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the invariants every normalizer relies on
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.messages.is_empty() {
            return Err(LlmError::Validation("messages must not be empty".to_owned()));
        }

        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err(LlmError::Validation("model must not be empty".to_owned()));
        }

        if self.params.max_tokens == Some(0) {
            return Err(LlmError::Validation("max_tokens must be positive".to_owned()));
        }

        if let Some(tools) = &self.tools
            && let Some(tool) = tools.iter().find(|t| t.name.trim().is_empty())
        {
            return Err(LlmError::Validation(format!(
                "tool names must not be empty (description: {:?})",
                tool.description
            )));
        }

        Ok(())
    }

    /// Model to send, validated and resolved against the provider default
    pub(crate) fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default)
    }

    /// All system messages joined with newlines, in original order
    ///
    /// Providers with a single system slot (Anthropic, Gemini) receive this
    /// instead of individual system messages.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_text())
            .collect();

        if parts.is_empty() { None } else { Some(parts.join("\n")) }
    }

    /// Messages other than system instructions
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}
