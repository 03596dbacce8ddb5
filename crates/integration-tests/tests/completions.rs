mod harness;

use aihttp_config::ProviderKind;
use aihttp_llm::{CompletionRequest, FinishReason, LlmClient, LlmError, Message, ToolDefinition};
use harness::config::ConfigBuilder;
use harness::mock_vendor::MockVendor;
use serde_json::json;

fn weather_tool() -> ToolDefinition {
    ToolDefinition::new(
        "get_weather",
        "Get current weather",
        json!({
            "type": "object",
            "properties": { "location": { "type": "string" } },
            "required": ["location"]
        }),
    )
}

fn hello() -> CompletionRequest {
    CompletionRequest::new(vec![Message::system("Be brief."), Message::user("Hello")])
}

#[tokio::test]
async fn openai_completion_returns_response() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("openai", ProviderKind::Openai, &mock.openai_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let response = client.send("openai", &hello().with_model("mock-model-1")).await.unwrap();

    assert_eq!(response.content, "Hello from mock");
    assert_eq!(response.model, "mock-model-1");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.total_tokens, 15);

    let recorded = mock.last_request().unwrap();
    assert_eq!(recorded.headers["authorization"], "Bearer test-key");
    assert_eq!(recorded.body["messages"][0]["role"], "system");
    assert!(recorded.body.get("stream").is_none());
}

#[tokio::test]
async fn anthropic_completion_returns_response() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("claude", ProviderKind::Anthropic, &mock.anthropic_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let response = client.send("claude", &hello()).await.unwrap();

    assert_eq!(response.content, "Hello from mock");
    assert_eq!(response.model, "claude-3-haiku-20240307");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.total_tokens, 16);

    let recorded = mock.last_request().unwrap();
    assert_eq!(recorded.headers["x-api-key"], "test-key");
    assert_eq!(recorded.headers["anthropic-version"], "2023-06-01");
    assert_eq!(recorded.body["system"], "Be brief.");
    assert_eq!(recorded.body["max_tokens"], 1000);
    assert_eq!(recorded.body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn gemini_completion_puts_model_in_path() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("gemini", ProviderKind::Gemini, &mock.gemini_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let response = client.send("gemini", &hello()).await.unwrap();

    assert_eq!(response.content, "Hello from mock");
    assert_eq!(response.model, "gemini-1.5-flash");
    assert_eq!(response.usage.total_tokens, 9);

    let recorded = mock.last_request().unwrap();
    assert_eq!(recorded.path, "/v1beta/models/gemini-1.5-flash:generateContent");
    assert_eq!(recorded.headers["x-goog-api-key"], "test-key");
    assert!(recorded.body.get("model").is_none());
    assert_eq!(recorded.body["contents"], json!([{ "role": "user", "parts": [{ "text": "Hello" }] }]));
    assert_eq!(recorded.body["systemInstruction"]["parts"][0]["text"], "Be brief.");
}

#[tokio::test]
async fn grok_and_openrouter_share_the_openai_wire_format() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("grok", ProviderKind::Grok, &mock.openai_url())
        .with_provider("openrouter", ProviderKind::Openrouter, &mock.openai_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let grok = client.send("grok", &hello()).await.unwrap();
    assert_eq!(grok.model, "grok-3-mini");

    let openrouter = client.send("openrouter", &hello()).await.unwrap();
    assert_eq!(openrouter.model, "openai/gpt-4o-mini");
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test]
async fn tool_calls_are_extracted_for_every_protocol() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("openai", ProviderKind::Openai, &mock.openai_url())
        .with_provider("claude", ProviderKind::Anthropic, &mock.anthropic_url())
        .with_provider("gemini", ProviderKind::Gemini, &mock.gemini_url())
        .build();
    let mut client = LlmClient::from_config(&config).unwrap();
    client.tools_mut().register(weather_tool());

    let request = CompletionRequest::new(vec![Message::user("What is the weather?")]);

    let openai = client.send("openai", &request).await.unwrap();
    assert_eq!(openai.finish_reason, FinishReason::ToolCalls);
    assert_eq!(openai.tool_calls[0].id, "call_mock_1");
    assert_eq!(openai.tool_calls[0].name, "get_weather");
    assert_eq!(
        openai.tool_calls[0].parse_arguments().unwrap(),
        json!({ "location": "San Francisco" })
    );
    assert_eq!(mock.last_request().unwrap().body["tools"][0]["type"], "function");

    let claude = client.send("claude", &request).await.unwrap();
    assert_eq!(claude.content, "Checking.");
    assert_eq!(claude.finish_reason, FinishReason::ToolCalls);
    assert_eq!(claude.tool_calls[0].id, "toolu_mock_1");
    assert_eq!(claude.tool_calls[0].parse_arguments().unwrap(), json!({ "location": "Paris" }));
    assert!(mock.last_request().unwrap().body["tools"][0]["input_schema"].is_object());

    let gemini = client.send("gemini", &request).await.unwrap();
    assert_eq!(gemini.finish_reason, FinishReason::ToolCalls);
    assert_eq!(gemini.tool_calls[0].id, "call_0");
    assert_eq!(gemini.tool_calls[0].parse_arguments().unwrap(), json!({ "location": "Paris" }));
    assert_eq!(
        mock.last_request().unwrap().body["tools"][0]["functionDeclarations"][0]["parameters"]["required"],
        json!(["location"])
    );
}

#[tokio::test]
async fn server_error_is_provider_error() {
    let mock = MockVendor::start_failing(1).await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("openai", ProviderKind::Openai, &mock.openai_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let err = client.send("openai", &hello()).await.unwrap_err();
    match &err {
        LlmError::Provider { status, body, .. } => {
            assert_eq!(status.as_u16(), 500);
            assert!(body.contains("intentional failure"));
        }
        other => panic!("expected provider error, got {other:?}"),
    }
    assert!(err.is_retryable());

    // This layer does not retry; the next call succeeds on its own
    assert!(client.send("openai", &hello()).await.is_ok());
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test]
async fn missing_api_key_fails_without_network_call() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_unkeyed_provider("claude", ProviderKind::Anthropic, &mock.anthropic_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    assert!(!client.provider("claude").unwrap().is_configured());
    let err = client.send("claude", &hello()).await.unwrap_err();

    assert!(matches!(err, LlmError::Configuration { .. }));
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn empty_messages_fail_validation() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("gemini", ProviderKind::Gemini, &mock.gemini_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let err = client.send("gemini", &CompletionRequest::new(vec![])).await.unwrap_err();

    assert!(matches!(err, LlmError::Validation(_)));
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn list_models_and_connection_test() {
    let mock = MockVendor::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("openai", ProviderKind::Openai, &mock.openai_url())
        .with_provider("claude", ProviderKind::Anthropic, &mock.anthropic_url())
        .build();
    let client = LlmClient::from_config(&config).unwrap();

    let models = client.list_models("openai").await.unwrap();
    assert_eq!(models.keys().collect::<Vec<_>>(), vec!["mock-model-1", "mock-model-2"]);
    assert!(client.list_models("claude").await.unwrap().is_empty());

    let result = client.test_connection("claude").await.unwrap();
    assert!(result.success, "{}", result.message);
    assert_eq!(mock.last_request().unwrap().body["max_tokens"], 5);
}
