use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Anything the vendor reported that has no unified counterpart
    #[default]
    Unknown,
}

impl FinishReason {
    /// Map an OpenAI-family `finish_reason`
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" | "function_call" => Self::ToolCalls,
            _ => Self::Unknown,
        }
    }

    /// Map an Anthropic `stop_reason`
    pub fn from_anthropic(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop_sequence" => Self::Stop,
            "max_tokens" => Self::Length,
            "tool_use" => Self::ToolCalls,
            _ => Self::Unknown,
        }
    }

    /// Map a Gemini `finishReason`
    ///
    /// Gemini reports `STOP` for function calls too, so the caller says
    /// whether the candidate carried any.
    pub fn from_gemini(reason: &str, has_function_calls: bool) -> Self {
        match reason {
            "STOP" if has_function_calls => Self::ToolCalls,
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::Length,
            _ => Self::Unknown,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Build usage, deriving the total when the vendor omits it
    pub const fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: Option<u32>) -> Self {
        let total_tokens = match total_tokens {
            Some(total) => total,
            None => prompt_tokens.saturating_add(completion_tokens),
        };
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Unified completion response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text, empty when the model only called tools
    pub content: String,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, zero when the vendor reported none
    pub usage: Usage,
    /// Model that produced the response
    pub model: String,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Original vendor payload; for streams, the ordered decoded event payloads
    #[serde(default)]
    pub raw: serde_json::Value,
}
