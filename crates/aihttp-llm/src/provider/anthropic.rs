//! Anthropic Messages API provider implementation

use std::sync::Arc;

use aihttp_config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use super::openai::cancelled;
use super::{Provider, ProviderCapabilities, ProviderCore, inline_local_files};
use crate::convert::anthropic as convert_anthropic;
use crate::error::LlmError;
use crate::events::ErrorListener;
use crate::sse::{self, AnthropicStreamDecoder, ChunkCallback, StreamContext};
use crate::transport::Transport;
use crate::types::{CompletionRequest, CompletionResponse};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    core: ProviderCore,
}

impl AnthropicProvider {
    /// Create from provider configuration
    pub fn new(name: String, config: &ProviderConfig, transport: Arc<dyn Transport>) -> Result<Self, LlmError> {
        Ok(Self {
            core: ProviderCore::new(name, config, transport, DEFAULT_BASE_URL, DEFAULT_MODEL)?,
        })
    }

    /// Report failures to `listener`
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.core.set_listener(listener);
        self
    }

    fn auth(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", self.core.key_header("")?);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        Ok(headers)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let auth = self.auth()?;
        let mut request = inline_local_files(request).await?.into_owned();
        request.stream = false;
        let model = self.core.model(&request);

        let wire = convert_anthropic::normalize_request(&request, model, &self.core.base_url)?;
        let body = serde_json::to_value(&wire.body).map_err(|e| LlmError::Validation(e.to_string()))?;
        let http = self
            .core
            .request(Method::POST, wire.url, auth)
            .json(body)
            .timeout(self.core.timeout_for(&request));

        let value = self.core.execute_json(http).await?;
        convert_anthropic::normalize_response(value, &self.core.name)
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        let auth = self.auth()?;
        let mut request = inline_local_files(request).await?.into_owned();
        request.stream = true;
        let model = self.core.model(&request);

        let wire = convert_anthropic::normalize_request(&request, model, &self.core.base_url)?;
        let body = serde_json::to_value(&wire.body).map_err(|e| LlmError::Validation(e.to_string()))?;
        let endpoint = wire.url.to_string();
        let timeout = self.core.timeout_for(&request);
        let http = self.core.request(Method::POST, wire.url, auth).json(body).timeout(timeout);

        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(&self.core.name, &endpoint)),
            stream = self.core.open_stream(http) => stream?,
        };

        let ctx = StreamContext {
            provider: &self.core.name,
            endpoint: &endpoint,
            model,
            cancel,
            idle_timeout: timeout,
        };
        sse::drive(stream.body, &mut AnthropicStreamDecoder::default(), &ctx, on_chunk).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            file_upload: false,
            model_listing: false,
        }
    }

    fn is_configured(&self) -> bool {
        self.core.is_configured()
    }

    fn default_model(&self) -> &str {
        &self.core.default_model
    }

    fn test_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.complete(request)
            .await
            .inspect_err(|e| self.core.report(e, "send"))
    }

    async fn send_streaming_with_cancel(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        self.stream(request, cancel, on_chunk)
            .await
            .inspect_err(|e| self.core.report(e, "send_streaming"))
    }

    /// Anthropic offers no model listing to this client; the map is empty
    async fn list_models(&self) -> Result<IndexMap<String, String>, LlmError> {
        Ok(IndexMap::new())
    }
}
