mod harness;

use std::time::Duration;

use aihttp_config::ProviderKind;
use aihttp_llm::{
    CompletionRequest, FinishReason, LlmClient, LlmError, Message, StreamChunk, ToolDefinition, TransportErrorKind,
};
use harness::config::ConfigBuilder;
use harness::mock_vendor::{MockVendor, STALL_MODEL};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn all_vendors(mock: &MockVendor) -> LlmClient {
    let config = ConfigBuilder::new()
        .with_provider("openai", ProviderKind::Openai, &mock.openai_url())
        .with_provider("claude", ProviderKind::Anthropic, &mock.anthropic_url())
        .with_provider("gemini", ProviderKind::Gemini, &mock.gemini_url())
        .build();
    LlmClient::from_config(&config).unwrap()
}

/// Stream through `provider`, returning the response and every chunk seen
async fn collect(
    client: &LlmClient,
    provider: &str,
    request: &CompletionRequest,
) -> (aihttp_llm::CompletionResponse, Vec<StreamChunk>) {
    let mut chunks = Vec::new();
    let response = client
        .send_streaming(provider, request, &mut |chunk: &StreamChunk| chunks.push(chunk.clone()))
        .await
        .unwrap();
    (response, chunks)
}

fn streamed_text(chunks: &[StreamChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Content { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn every_vendor_streams_text_with_a_single_done() {
    let mock = MockVendor::start().await.unwrap();
    let client = all_vendors(&mock).await;
    let request = CompletionRequest::new(vec![Message::user("Hello")]);

    for (provider, expected_tokens) in [("openai", 13), ("claude", 15), ("gemini", 9)] {
        let (response, chunks) = collect(&client, provider, &request).await;

        assert_eq!(streamed_text(&chunks), "Hello from mock", "{provider}");
        assert_eq!(response.content, "Hello from mock", "{provider}");
        assert_eq!(response.finish_reason, FinishReason::Stop, "{provider}");
        assert_eq!(response.usage.total_tokens, expected_tokens, "{provider}");
        assert_eq!(chunks.iter().filter(|c| c.is_done()).count(), 1, "{provider}");
        assert!(chunks.last().is_some_and(StreamChunk::is_done), "{provider}");
    }
}

#[tokio::test]
async fn streaming_requests_are_flagged_on_the_wire() {
    let mock = MockVendor::start().await.unwrap();
    let client = all_vendors(&mock).await;
    let request = CompletionRequest::new(vec![Message::user("Hello")]);

    collect(&client, "openai", &request).await;
    let recorded = mock.last_request().unwrap();
    assert_eq!(recorded.body["stream"], true);
    // Not the canonical OpenAI host, so no stream_options
    assert!(recorded.body.get("stream_options").is_none());

    collect(&client, "claude", &request).await;
    assert_eq!(mock.last_request().unwrap().body["stream"], true);

    collect(&client, "gemini", &request).await;
    assert_eq!(
        mock.last_request().unwrap().path,
        "/v1beta/models/gemini-1.5-flash:streamGenerateContent"
    );
}

#[tokio::test]
async fn streamed_tool_call_fragments_are_assembled() {
    let mock = MockVendor::start().await.unwrap();
    let client = all_vendors(&mock).await;
    let request = CompletionRequest::new(vec![Message::user("What is the weather?")]).with_tools(vec![
        ToolDefinition::new(
            "get_weather",
            "Get current weather",
            json!({ "type": "object", "properties": { "location": { "type": "string" } } }),
        ),
    ]);

    for (provider, id) in [("openai", "call_stream_1"), ("claude", "toolu_mock_1"), ("gemini", "call_0")] {
        let (response, chunks) = collect(&client, provider, &request).await;

        assert_eq!(response.finish_reason, FinishReason::ToolCalls, "{provider}");
        assert_eq!(response.tool_calls.len(), 1, "{provider}");
        assert_eq!(response.tool_calls[0].id, id, "{provider}");
        assert_eq!(response.tool_calls[0].name, "get_weather", "{provider}");
        assert_eq!(
            response.tool_calls[0].parse_arguments().unwrap(),
            json!({ "location": "Paris" }),
            "{provider}"
        );
        assert!(chunks.iter().any(|c| matches!(c, StreamChunk::ToolCall(_))), "{provider}");
    }
}

#[tokio::test]
async fn cancelling_mid_stream_stops_callbacks() {
    let mock = MockVendor::start().await.unwrap();
    let client = all_vendors(&mock).await;
    let request = CompletionRequest::new(vec![Message::user("Hello")]).with_model(STALL_MODEL);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mut seen = Vec::new();

    let err = client
        .send_streaming_with_cancel("openai", &request, &cancel, &mut |chunk: &StreamChunk| {
            seen.push(chunk.clone());
            trigger.cancel();
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "expected cancellation, got {err:?}");
    assert_eq!(seen, vec![StreamChunk::content("partial")]);
}

#[tokio::test]
async fn stalled_stream_times_out() {
    let mock = MockVendor::start().await.unwrap();
    let client = all_vendors(&mock).await;
    let request = CompletionRequest::new(vec![Message::user("Hello")])
        .with_model(STALL_MODEL)
        .with_timeout(Duration::from_millis(300));

    let mut seen = 0;
    let err = client
        .send_streaming("openai", &request, &mut |_: &StreamChunk| seen += 1)
        .await
        .unwrap_err();

    assert!(
        matches!(err, LlmError::Transport { kind: TransportErrorKind::Timeout, .. }),
        "expected timeout, got {err:?}"
    );
    assert_eq!(seen, 1);
}
