//! Unified types to and from the Gemini `generateContent` format

use serde_json::Value;
use url::Url;

use super::{WireRequest, clamp, endpoint, require_conversation, unresolved};
use crate::error::LlmError;
use crate::protocol::gemini::{
    GeminiContent, GeminiFileData, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest,
    GeminiResponse, GeminiTool,
};
use crate::tools::{gemini_calls, gemini_declaration, gemini_tool_config};
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FileRef, FileSource, FinishReason, Role, Usage,
};

/// Model id without the `models/` resource prefix
pub fn bare_model(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

/// Build a `generateContent` request
///
/// The model goes into the URL; streaming requests target
/// `:streamGenerateContent` with `alt=sse`.
pub fn normalize_request(
    request: &CompletionRequest,
    model: &str,
    base_url: &Url,
) -> Result<WireRequest<GeminiRequest>, LlmError> {
    request.validate()?;
    require_conversation(request)?;

    let contents = request
        .conversation()
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                Role::User | Role::System => "user",
            };
            Ok(GeminiContent {
                role: Some(role.to_owned()),
                parts: content_to_parts(&m.content)?,
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    let system_instruction = request.system_prompt().map(|text| GeminiContent {
        role: None,
        parts: vec![GeminiPart::text(text)],
    });

    let params = &request.params;
    let generation_config = GeminiGenerationConfig {
        temperature: clamp(params.temperature, 0.0, 2.0),
        top_p: clamp(params.top_p, 0.0, 1.0),
        top_k: params.top_k,
        max_output_tokens: params.max_tokens,
        stop_sequences: params.stop.clone(),
    };

    let body = GeminiRequest {
        contents,
        system_instruction,
        generation_config: (generation_config != GeminiGenerationConfig::default()).then_some(generation_config),
        tools: request.tools.as_ref().map(|tools| {
            vec![GeminiTool {
                function_declarations: tools.iter().map(gemini_declaration).collect(),
            }]
        }),
        tool_config: request.tool_choice.as_ref().map(gemini_tool_config),
    };

    let model = bare_model(model);
    let mut url = if request.stream {
        endpoint(base_url, &format!("models/{model}:streamGenerateContent"))?
    } else {
        endpoint(base_url, &format!("models/{model}:generateContent"))?
    };
    if request.stream {
        url.query_pairs_mut().append_pair("alt", "sse");
    }

    Ok(WireRequest { url, body })
}

fn content_to_parts(content: &Content) -> Result<Vec<GeminiPart>, LlmError> {
    let mut parts = match content {
        Content::Text(text) if text.is_empty() => Vec::new(),
        Content::Text(text) => vec![GeminiPart::text(text.clone())],
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Ok(GeminiPart::text(text.clone())),
                ContentPart::File { file } => file_to_part(file),
            })
            .collect::<Result<Vec<_>, LlmError>>()?,
    };

    // Gemini rejects contents without parts
    if parts.is_empty() {
        parts.push(GeminiPart::text(String::new()));
    }

    Ok(parts)
}

fn file_to_part(file: &FileRef) -> Result<GeminiPart, LlmError> {
    match &file.source {
        FileSource::Uri(uri) => Ok(GeminiPart {
            file_data: Some(GeminiFileData {
                mime_type: file.mime_type.clone(),
                file_uri: uri.clone(),
            }),
            ..GeminiPart::default()
        }),
        FileSource::Data(data) => Ok(GeminiPart {
            inline_data: Some(GeminiInlineData {
                mime_type: file.mime_type.clone(),
                data: data.clone(),
            }),
            ..GeminiPart::default()
        }),
        FileSource::Path(_) => Err(unresolved(file)),
    }
}

/// Convert a decoded `generateContent` body
///
/// Gemini does not echo the model id; `model` is what was requested, used
/// when the body carries no `modelVersion`.
pub fn normalize_response(value: Value, provider: &str, model: &str) -> Result<CompletionResponse, LlmError> {
    let response: GeminiResponse = serde_json::from_value(value.clone()).map_err(|e| LlmError::parse(provider, e))?;

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| LlmError::parse(provider, "response contains no candidates"))?;

    let content = candidate
        .content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<String>();

    let usage = response
        .usage_metadata
        .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count, u.total_token_count))
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        tool_calls: gemini_calls(candidate),
        usage,
        model: response
            .model_version
            .clone()
            .unwrap_or_else(|| bare_model(model).to_owned()),
        finish_reason: candidate
            .finish_reason
            .as_deref()
            .map_or(FinishReason::Unknown, |r| {
                FinishReason::from_gemini(r, candidate.has_function_calls())
            }),
        raw: value,
    })
}
