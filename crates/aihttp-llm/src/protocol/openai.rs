//! `OpenAI` chat completion wire format, shared by Grok and `OpenRouter`

use serde::{Deserialize, Serialize};

// -- Request types --

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OpenAiMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Stream options (e.g. `include_usage`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    /// `"auto"`, `"required"`, `"none"` or a forced function
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
}

/// Stream options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamOptions {
    /// Include usage statistics in the final chunk
    pub include_usage: bool,
}

/// Message within a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// String or array of content parts
    pub content: OpenAiContent,
}

/// Content can be a string or an array of parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    /// Plain text content
    Text(String),
    /// Array of content parts
    Parts(Vec<OpenAiContentPart>),
}

/// Individual content part
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    /// Text content
    Text { text: String },
    /// Image by URL or data URI
    ImageUrl { image_url: OpenAiImageUrl },
    /// Non-image file sent inline
    File { file: OpenAiFile },
}

/// Image URL reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiImageUrl {
    /// Image URL or base64 data URI
    pub url: String,
}

/// Inline file attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFile {
    /// Data URI carrying the file bytes
    pub file_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    /// Always `"function"`
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function definition
    pub function: OpenAiFunction,
}

/// Function name, description and parameter schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

/// Tool call within a response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub tool_type: String,
    pub function: OpenAiFunctionCall,
}

/// Function call details within a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

// -- Response types --

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiResponse {
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Generated choices
    pub choices: Vec<OpenAiChoice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

/// Choice within a response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoice {
    /// Generated message
    pub message: OpenAiChoiceMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message within a response choice
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

/// Token usage
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

// -- Streaming types --

/// Streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub model: Option<String>,
    /// Delta choices; empty on the trailing usage chunk
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    /// Present on the final chunk when `include_usage` was requested
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
    /// Mid-stream error envelope (`OpenRouter`)
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub delta: OpenAiStreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content within a streaming choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

/// Tool call fragment within a streaming delta
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamToolCall {
    /// Index within the `tool_calls` array
    #[serde(default)]
    pub index: u32,
    /// First fragment only
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAiStreamFunctionCall>,
}

/// Partial function call within a streaming tool call
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamFunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// -- Models list types --

/// Models list response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiModelList {
    pub data: Vec<OpenAiModel>,
}

/// Model entry
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
    /// Human-readable name (`OpenRouter` only)
    #[serde(default)]
    pub name: Option<String>,
}
