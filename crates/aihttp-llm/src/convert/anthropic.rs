//! Unified types to and from the Anthropic Messages format

use serde_json::Value;
use url::Url;

use super::{WireRequest, clamp, endpoint, require_conversation, unresolved};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse,
    AnthropicResponseBlock, AnthropicSource,
};
use crate::tools::{anthropic_calls, anthropic_tool, anthropic_tool_choice};
use crate::types::{CompletionRequest, CompletionResponse, Content, ContentPart, FileRef, FileSource, FinishReason, Usage};

/// Used when the caller leaves `max_tokens` unset; Anthropic requires it
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
const MAX_TOKENS_CEILING: u32 = 4096;

/// Build a Messages API request
///
/// System messages move to the top-level `system` field, newline-joined.
pub fn normalize_request(
    request: &CompletionRequest,
    model: &str,
    base_url: &Url,
) -> Result<WireRequest<AnthropicRequest>, LlmError> {
    request.validate()?;
    require_conversation(request)?;

    let messages = request
        .conversation()
        .map(|m| {
            Ok(AnthropicMessage {
                role: m.role.as_str().to_owned(),
                content: content_to_anthropic(&m.content)?,
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    let params = &request.params;

    // `none` is expressed by not offering tools at all
    let tool_choice = request.tool_choice.as_ref().map(anthropic_tool_choice);
    let tools_disabled = matches!(tool_choice, Some(None));

    let body = AnthropicRequest {
        model: model.to_owned(),
        max_tokens: params
            .max_tokens
            .unwrap_or(DEFAULT_MAX_TOKENS)
            .clamp(1, MAX_TOKENS_CEILING),
        system: request.system_prompt(),
        messages,
        temperature: clamp(params.temperature, 0.0, 1.0),
        top_p: clamp(params.top_p, 0.0, 1.0),
        top_k: params.top_k.filter(|k| *k >= 1),
        stop_sequences: params.stop.clone(),
        stream: request.stream.then_some(true),
        tools: request
            .tools
            .as_ref()
            .filter(|_| !tools_disabled)
            .map(|tools| tools.iter().map(anthropic_tool).collect()),
        tool_choice: tool_choice.flatten(),
    };

    Ok(WireRequest {
        url: endpoint(base_url, "v1/messages")?,
        body,
    })
}

fn content_to_anthropic(content: &Content) -> Result<AnthropicContent, LlmError> {
    match content {
        Content::Text(text) => Ok(AnthropicContent::Text(text.clone())),
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Ok(AnthropicContentBlock::Text { text: text.clone() }),
                ContentPart::File { file } => file_to_anthropic(file),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AnthropicContent::Blocks),
    }
}

fn file_to_anthropic(file: &FileRef) -> Result<AnthropicContentBlock, LlmError> {
    let source = match &file.source {
        FileSource::Data(data) => AnthropicSource::Base64 {
            media_type: file.mime_type.clone(),
            data: data.clone(),
        },
        FileSource::Uri(url) => AnthropicSource::Url { url: url.clone() },
        FileSource::Path(_) => return Err(unresolved(file)),
    };

    Ok(if file.is_image() {
        AnthropicContentBlock::Image { source }
    } else {
        AnthropicContentBlock::Document { source }
    })
}

/// Convert a decoded Messages API body
pub fn normalize_response(value: Value, provider: &str) -> Result<CompletionResponse, LlmError> {
    let response: AnthropicResponse =
        serde_json::from_value(value.clone()).map_err(|e| LlmError::parse(provider, e))?;

    let content = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicResponseBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<String>();

    let usage = response
        .usage
        .map(|u| Usage::new(u.input_tokens, u.output_tokens, None))
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        tool_calls: anthropic_calls(&response.content),
        usage,
        model: response.model,
        finish_reason: response
            .stop_reason
            .as_deref()
            .map_or(FinishReason::Unknown, FinishReason::from_anthropic),
        raw: value,
    })
}
