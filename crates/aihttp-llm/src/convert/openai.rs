//! Unified types to and from the `OpenAI` chat completion format

use serde_json::Value;
use url::Url;

use super::{WireRequest, clamp, data_uri, endpoint, unresolved};
use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFile, OpenAiImageUrl, OpenAiMessage, OpenAiRequest, OpenAiResponse,
    OpenAiStreamOptions,
};
use crate::tools::{openai_calls, openai_tool, openai_tool_choice};
use crate::types::{CompletionRequest, CompletionResponse, Content, ContentPart, FileRef, FileSource, FinishReason, Usage};

const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

/// Build a chat completion request
///
/// `include_usage` asks for a trailing usage chunk on streams; only the
/// canonical API accepts it.
pub fn normalize_request(
    request: &CompletionRequest,
    model: &str,
    base_url: &Url,
    include_usage: bool,
) -> Result<WireRequest<OpenAiRequest>, LlmError> {
    request.validate()?;

    let messages = request
        .messages
        .iter()
        .map(|m| {
            Ok(OpenAiMessage {
                role: m.role.as_str().to_owned(),
                content: content_to_openai(&m.content)?,
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    let params = &request.params;
    let (min_temp, max_temp) = TEMPERATURE_RANGE;

    let body = OpenAiRequest {
        model: model.to_owned(),
        messages,
        temperature: clamp(params.temperature, min_temp, max_temp),
        top_p: clamp(params.top_p, 0.0, 1.0),
        max_tokens: params.max_tokens,
        stop: params.stop.clone(),
        stream: request.stream.then_some(true),
        stream_options: (request.stream && include_usage).then_some(OpenAiStreamOptions { include_usage: true }),
        tools: request.tools.as_ref().map(|tools| tools.iter().map(openai_tool).collect()),
        tool_choice: request.tool_choice.as_ref().map(openai_tool_choice),
    };

    Ok(WireRequest {
        url: endpoint(base_url, "chat/completions")?,
        body,
    })
}

fn content_to_openai(content: &Content) -> Result<OpenAiContent, LlmError> {
    match content {
        Content::Text(text) => Ok(OpenAiContent::Text(text.clone())),
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Ok(OpenAiContentPart::Text { text: text.clone() }),
                ContentPart::File { file } => file_to_openai(file),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(OpenAiContent::Parts),
    }
}

fn file_to_openai(file: &FileRef) -> Result<OpenAiContentPart, LlmError> {
    match (&file.source, file.is_image()) {
        (FileSource::Uri(uri), true) => Ok(OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl { url: uri.clone() },
        }),
        (FileSource::Data(data), true) => Ok(OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl {
                url: data_uri(&file.mime_type, data),
            },
        }),
        (FileSource::Data(data), false) => Ok(OpenAiContentPart::File {
            file: OpenAiFile {
                file_data: data_uri(&file.mime_type, data),
                filename: None,
            },
        }),
        (FileSource::Uri(uri), false) => Err(LlmError::Validation(format!(
            "remote {} file {uri} cannot be referenced by URL; send it inline",
            file.mime_type
        ))),
        (FileSource::Path(_), _) => Err(unresolved(file)),
    }
}

/// Error message carried in a 2xx body, as `OpenRouter` reports upstream failures
pub fn error_envelope(value: &Value) -> Option<String> {
    if value.get("choices").is_some() {
        return None;
    }
    value.get("error").map(|e| {
        e.get("message")
            .and_then(Value::as_str)
            .map_or_else(|| e.to_string(), str::to_owned)
    })
}

/// Convert a decoded chat completion body
pub fn normalize_response(value: Value, provider: &str) -> Result<CompletionResponse, LlmError> {
    let response: OpenAiResponse = serde_json::from_value(value.clone()).map_err(|e| LlmError::parse(provider, e))?;

    let choice = response
        .choices
        .first()
        .ok_or_else(|| LlmError::parse(provider, "response contains no choices"))?;

    let tool_calls = choice.message.tool_calls.as_deref().map(openai_calls).unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.content.clone().unwrap_or_default(),
        tool_calls,
        usage: response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or_default(),
        model: response.model,
        finish_reason: choice
            .finish_reason
            .as_deref()
            .map_or(FinishReason::Unknown, FinishReason::from_openai),
        raw: value,
    })
}
