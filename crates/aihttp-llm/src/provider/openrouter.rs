//! `OpenRouter`, served through the OpenAI-compatible provider
//!
//! `OpenRouter` attributes traffic to an application through the
//! `HTTP-Referer` and `X-Title` headers; set them under the provider's
//! `headers` table.

use std::sync::Arc;

use aihttp_config::{ProviderConfig, ProviderKind};

use super::openai::{CompatProfile, OpenAiProvider};
use crate::error::LlmError;
use crate::transport::Transport;

pub const OPENROUTER: CompatProfile = CompatProfile {
    kind: ProviderKind::Openrouter,
    default_base_url: "https://openrouter.ai/api/v1",
    default_model: "openai/gpt-4o-mini",
    test_model: "openai/gpt-4o-mini",
    named_models: true,
};

/// Create an `OpenRouter` provider
pub fn new(name: String, config: &ProviderConfig, transport: Arc<dyn Transport>) -> Result<OpenAiProvider, LlmError> {
    OpenAiProvider::new(name, config, transport, OPENROUTER)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::provider::Provider;
    use crate::transport::ReqwestTransport;
    use crate::types::{CompletionRequest, Message, StreamChunk};

    fn provider(server: &MockServer) -> OpenAiProvider {
        let config = ProviderConfig::new(ProviderKind::Openrouter)
            .with_api_key("or-test")
            .with_base_url(format!("{}/api/v1", server.uri()).parse().unwrap())
            .with_header("HTTP-Referer", "https://forum.example")
            .with_header("X-Title", "Forum Bot");
        new("openrouter".to_owned(), &config, Arc::new(ReqwestTransport::new())).unwrap()
    }

    #[tokio::test]
    async fn attribution_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("http-referer", "https://forum.example"))
            .and(header("x-title", "Forum Bot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "openai/gpt-4o-mini",
                "choices": [{ "message": { "content": "ok" }, "finish_reason": "stop" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server)
            .send(&CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.model, "openai/gpt-4o-mini");
    }

    #[tokio::test]
    async fn error_envelope_in_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "message": "No endpoints found", "code": 404 }
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .send(&CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Upstream { ref body, .. } if body == "No endpoints found"));
    }

    #[tokio::test]
    async fn error_envelope_in_streaming_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "message": "No endpoints found", "code": 404 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut chunks = Vec::new();
        let err = provider(&server)
            .send_streaming(
                &CompletionRequest::new(vec![Message::user("hi")]),
                &mut |c: &StreamChunk| chunks.push(c.clone()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Upstream { ref body, .. } if body == "No endpoints found"));
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn models_use_display_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "anthropic/claude-3-haiku", "name": "Anthropic: Claude 3 Haiku" },
                    { "id": "openai/gpt-4o-mini" }
                ]
            })))
            .mount(&server)
            .await;

        let models = provider(&server).list_models().await.unwrap();
        assert_eq!(models["anthropic/claude-3-haiku"], "Anthropic: Claude 3 Haiku");
        assert_eq!(models["openai/gpt-4o-mini"], "openai/gpt-4o-mini");
    }
}
