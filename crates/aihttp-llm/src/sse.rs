//! Server-Sent Event streaming
//!
//! Framing comes from `eventsource-stream`: bytes are buffered until a blank
//! line completes an event, so vendor chunks may split anywhere. Each event
//! payload is decoded by a per-vendor [`StreamDecoder`] into
//! [`StreamChunk`]s, delivered in order to the caller and folded by a
//! [`StreamAssembler`] into the final response.

use std::time::Duration;

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::convert::openai::error_envelope;
use crate::error::{LlmError, TransportErrorKind};
use crate::protocol::anthropic::{AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent};
use crate::protocol::gemini::GeminiResponse;
use crate::protocol::openai::OpenAiStreamChunk;
use crate::tools::{ToolCallAccumulator, encode_arguments};
use crate::transport::TransportFailure;
use crate::types::{CompletionResponse, FinishReason, StreamChunk, ToolCallDelta, Usage};

/// Terminal sentinel used by the `OpenAI` family
const DONE_SENTINEL: &str = "[DONE]";

/// Bytes kept to explain a stream body that framed no events
const UNFRAMED_BODY_LIMIT: usize = 64 * 1024;

/// Why an event payload produced no chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFault {
    /// Payload did not match the vendor's event shape; skipped
    Malformed(String),
    /// Vendor reported an error inside the stream; ends it
    Upstream(String),
}

/// Turns one decoded event payload into unified chunks
pub trait StreamDecoder: Send {
    fn decode(&mut self, payload: &Value) -> Result<Vec<StreamChunk>, DecodeFault>;

    /// Model reported by the stream, if any
    fn model(&self) -> Option<&str>;
}

/// Decoder for `OpenAI`, Grok and `OpenRouter` chunks
#[derive(Debug, Default)]
pub struct OpenAiStreamDecoder {
    model: Option<String>,
}

impl StreamDecoder for OpenAiStreamDecoder {
    fn decode(&mut self, payload: &Value) -> Result<Vec<StreamChunk>, DecodeFault> {
        let chunk: OpenAiStreamChunk =
            serde_json::from_value(payload.clone()).map_err(|e| DecodeFault::Malformed(e.to_string()))?;

        if let Some(error) = chunk.error {
            return Err(DecodeFault::Upstream(error.to_string()));
        }

        if self.model.is_none() {
            self.model = chunk.model.filter(|m| !m.is_empty());
        }

        let mut chunks = Vec::new();
        let mut finish_reason = None;

        // Only the first choice is surfaced
        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                chunks.push(StreamChunk::content(text));
            }

            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = call
                    .function
                    .map(|f| (f.name, f.arguments.unwrap_or_default()))
                    .unwrap_or_default();
                chunks.push(StreamChunk::ToolCall(ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }));
            }

            finish_reason = choice.finish_reason.as_deref().map(FinishReason::from_openai);
        }

        let usage = chunk
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens, u.total_tokens));

        if finish_reason.is_some() || usage.is_some() {
            chunks.push(StreamChunk::Finish { finish_reason, usage });
        }

        Ok(chunks)
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Decoder for Anthropic Messages events
///
/// Content block indices count text blocks too; tool calls are renumbered
/// so that the first `tool_use` block is index 0.
#[derive(Debug, Default)]
pub struct AnthropicStreamDecoder {
    model: Option<String>,
    input_tokens: u32,
    /// Content block index to tool call index
    tool_blocks: Vec<(u32, u32)>,
}

impl AnthropicStreamDecoder {
    fn tool_index(&self, block: u32) -> Option<u32> {
        self.tool_blocks.iter().find(|(b, _)| *b == block).map(|(_, t)| *t)
    }
}

impl StreamDecoder for AnthropicStreamDecoder {
    fn decode(&mut self, payload: &Value) -> Result<Vec<StreamChunk>, DecodeFault> {
        let event: AnthropicStreamEvent =
            serde_json::from_value(payload.clone()).map_err(|e| DecodeFault::Malformed(e.to_string()))?;

        let chunks = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if !message.model.is_empty() {
                    self.model = Some(message.model);
                }
                self.input_tokens = message.usage.map_or(0, |u| u.input_tokens);
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::Text { text } if !text.is_empty() => vec![StreamChunk::content(text)],
                AnthropicStreamContentBlock::ToolUse { id, name } => {
                    #[allow(clippy::cast_possible_truncation)]
                    let tool_index = self.tool_blocks.len() as u32;
                    self.tool_blocks.push((index, tool_index));
                    vec![StreamChunk::ToolCall(ToolCallDelta {
                        index: tool_index,
                        id: Some(id),
                        name: Some(name),
                        arguments: String::new(),
                    })]
                }
                _ => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![StreamChunk::content(text)],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => match self.tool_index(index) {
                    Some(tool_index) => vec![StreamChunk::ToolCall(ToolCallDelta {
                        index: tool_index,
                        id: None,
                        name: None,
                        arguments: partial_json,
                    })],
                    None => {
                        return Err(DecodeFault::Malformed(format!(
                            "input_json_delta for block {index} without tool_use start"
                        )));
                    }
                },
                AnthropicStreamDelta::Other => Vec::new(),
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => vec![StreamChunk::Finish {
                finish_reason: delta.stop_reason.as_deref().map(FinishReason::from_anthropic),
                usage: usage.map(|u| {
                    let input = if u.input_tokens > 0 { u.input_tokens } else { self.input_tokens };
                    Usage::new(input, u.output_tokens, None)
                }),
            }],
            AnthropicStreamEvent::MessageStop => vec![StreamChunk::Done],
            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping => Vec::new(),
            AnthropicStreamEvent::Error { error } => return Err(DecodeFault::Upstream(error.to_string())),
        };

        Ok(chunks)
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Decoder for Gemini `streamGenerateContent?alt=sse` events
///
/// Every event is a complete `generateContent` response holding the next
/// slice of text. Function calls arrive whole, so each becomes a single
/// tool call fragment.
#[derive(Debug, Default)]
pub struct GeminiStreamDecoder {
    model: Option<String>,
    tool_calls_seen: u32,
}

impl StreamDecoder for GeminiStreamDecoder {
    fn decode(&mut self, payload: &Value) -> Result<Vec<StreamChunk>, DecodeFault> {
        if let Some(error) = payload.get("error") {
            return Err(DecodeFault::Upstream(error.to_string()));
        }

        let response: GeminiResponse =
            serde_json::from_value(payload.clone()).map_err(|e| DecodeFault::Malformed(e.to_string()))?;

        if let Some(version) = response.model_version {
            self.model = Some(version);
        }

        let usage = response
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count, u.total_token_count));

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Ok(usage
                .map(|usage| StreamChunk::Finish {
                    finish_reason: None,
                    usage: Some(usage),
                })
                .into_iter()
                .collect());
        };

        let mut chunks = Vec::new();
        for part in candidate.content.parts {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                chunks.push(StreamChunk::content(text));
            }
            if let Some(call) = part.function_call {
                let index = self.tool_calls_seen;
                self.tool_calls_seen += 1;
                chunks.push(StreamChunk::ToolCall(ToolCallDelta {
                    index,
                    id: Some(call.id.unwrap_or_else(|| format!("call_{index}"))),
                    name: Some(call.name),
                    arguments: encode_arguments(&call.args),
                }));
            }
        }

        if let Some(reason) = candidate.finish_reason {
            chunks.push(StreamChunk::Finish {
                finish_reason: Some(FinishReason::from_gemini(&reason, self.tool_calls_seen > 0)),
                usage,
            });
        }

        Ok(chunks)
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Folds stream chunks into a [`CompletionResponse`]
#[derive(Debug, Default)]
pub struct StreamAssembler {
    content: String,
    tool_calls: ToolCallAccumulator,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    events: Vec<Value>,
    done: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Content { text } => self.content.push_str(text),
            StreamChunk::ToolCall(delta) => self.tool_calls.push(delta),
            StreamChunk::Finish { finish_reason, usage } => {
                if finish_reason.is_some() {
                    self.finish_reason = *finish_reason;
                }
                if usage.is_some() {
                    self.usage = *usage;
                }
            }
            StreamChunk::Done => self.done = true,
        }
    }

    /// Keep a decoded event payload for [`CompletionResponse::raw`]
    pub fn record(&mut self, payload: Value) {
        self.events.push(payload);
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    pub fn finish(self, model: String) -> CompletionResponse {
        CompletionResponse {
            content: self.content,
            tool_calls: self.tool_calls.finish(),
            usage: self.usage.unwrap_or_default(),
            model,
            finish_reason: self.finish_reason.unwrap_or_default(),
            raw: Value::Array(self.events),
        }
    }
}

/// Where a stream comes from and how long reads may stall
pub struct StreamContext<'a> {
    pub provider: &'a str,
    pub endpoint: &'a str,
    /// Model to report when the stream names none
    pub model: &'a str,
    pub cancel: &'a CancellationToken,
    /// Longest wait for the next body chunk
    pub idle_timeout: Option<Duration>,
}

impl StreamContext<'_> {
    fn transport_error(&self, kind: TransportErrorKind, message: impl Into<String>) -> LlmError {
        LlmError::Transport {
            provider: self.provider.to_owned(),
            endpoint: self.endpoint.to_owned(),
            kind,
            message: message.into(),
        }
    }
}

/// Callback receiving chunks as they arrive
pub type ChunkCallback<'a> = dyn FnMut(&StreamChunk) + Send + 'a;

/// Read an SSE body to completion
///
/// Chunks go to `on_chunk` synchronously, in arrival order, and exactly one
/// [`StreamChunk::Done`] is delivered last. Reading stops at the first
/// terminal marker. Once `ctx.cancel` fires no further chunk is delivered
/// and the body is dropped.
///
/// A body that closes without framing a single event is an error: a JSON
/// error envelope becomes [`LlmError::Upstream`], anything else
/// [`LlmError::Parse`].
pub async fn drive<S>(
    body: S,
    decoder: &mut dyn StreamDecoder,
    ctx: &StreamContext<'_>,
    on_chunk: &mut ChunkCallback<'_>,
) -> Result<CompletionResponse, LlmError>
where
    S: Stream<Item = Result<Bytes, TransportFailure>> + Send,
{
    let mut assembler = StreamAssembler::new();
    let mut framed = false;
    let mut received = Vec::new();

    {
        let body = body.inspect(|chunk| {
            if let Ok(bytes) = chunk
                && received.len() < UNFRAMED_BODY_LIMIT
            {
                received.extend_from_slice(bytes);
            }
        });
        let mut events = std::pin::pin!(body.eventsource());

        while !assembler.is_done() {
            let next = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    return Err(ctx.transport_error(TransportErrorKind::Cancelled, "stream cancelled by caller"));
                }
                next = next_event(&mut events, ctx.idle_timeout) => next,
            };

            let event = match next {
                Ok(Some(Ok(event))) => event,
                Ok(Some(Err(EventStreamError::Transport(failure)))) => {
                    tracing::error!(provider = %ctx.provider, error = %failure, "stream interrupted");
                    return Err(ctx.transport_error(failure.kind, failure.message));
                }
                Ok(Some(Err(e))) => {
                    return Err(ctx.transport_error(TransportErrorKind::Body, e.to_string()));
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(ctx.transport_error(TransportErrorKind::Timeout, "no stream data before idle timeout"));
                }
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            framed = true;

            let chunks = if data == DONE_SENTINEL {
                vec![StreamChunk::Done]
            } else {
                let payload: Value = match serde_json::from_str(data) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(provider = %ctx.provider, error = %e, data = %data, "skipping malformed SSE payload");
                        continue;
                    }
                };

                let decoded = decoder.decode(&payload);
                assembler.record(payload);

                match decoded {
                    Ok(chunks) => chunks,
                    Err(DecodeFault::Malformed(reason)) => {
                        tracing::warn!(provider = %ctx.provider, error = %reason, "skipping unrecognized SSE event");
                        continue;
                    }
                    Err(DecodeFault::Upstream(body)) => {
                        return Err(LlmError::Upstream {
                            provider: ctx.provider.to_owned(),
                            endpoint: ctx.endpoint.to_owned(),
                            body,
                        });
                    }
                }
            };

            for chunk in chunks {
                if ctx.cancel.is_cancelled() {
                    return Err(ctx.transport_error(TransportErrorKind::Cancelled, "stream cancelled by caller"));
                }
                on_chunk(&chunk);
                assembler.push(&chunk);
                if chunk.is_done() {
                    break;
                }
            }
        }
    }

    if !assembler.is_done() {
        if ctx.cancel.is_cancelled() {
            return Err(ctx.transport_error(TransportErrorKind::Cancelled, "stream cancelled by caller"));
        }
        if !framed {
            return Err(unframed_body(ctx, &received));
        }
        tracing::debug!(provider = %ctx.provider, "stream closed without terminal marker");
        on_chunk(&StreamChunk::Done);
        assembler.push(&StreamChunk::Done);
    }

    let model = decoder.model().unwrap_or(ctx.model).to_owned();
    Ok(assembler.finish(model))
}

/// Error for a 2xx stream body that carried no SSE events
fn unframed_body(ctx: &StreamContext<'_>, received: &[u8]) -> LlmError {
    if received.iter().all(u8::is_ascii_whitespace) {
        return LlmError::parse(ctx.provider, "stream closed before any event");
    }

    match serde_json::from_slice::<Value>(received) {
        Ok(value) => match error_envelope(&value) {
            Some(body) => {
                tracing::warn!(provider = %ctx.provider, endpoint = %ctx.endpoint, "error envelope instead of event stream");
                LlmError::Upstream {
                    provider: ctx.provider.to_owned(),
                    endpoint: ctx.endpoint.to_owned(),
                    body,
                }
            }
            None => LlmError::parse(ctx.provider, "expected an event stream, got a JSON body"),
        },
        Err(_) => LlmError::parse(
            ctx.provider,
            format!("expected an event stream, got {} bytes without events", received.len()),
        ),
    }
}

async fn next_event<S>(events: &mut S, idle_timeout: Option<Duration>) -> Result<Option<S::Item>, tokio::time::error::Elapsed>
where
    S: Stream + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, events.next()).await,
        None => Ok(events.next().await),
    }
}
