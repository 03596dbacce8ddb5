//! OpenAI-compatible provider implementation
//!
//! One implementation serves `OpenAI`, Grok and `OpenRouter`; a
//! [`CompatProfile`] carries what differs between them.

use std::sync::Arc;

use aihttp_config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use http::{HeaderMap, Method, header};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use super::{Provider, ProviderCapabilities, ProviderCore, inline_local_files};
use crate::convert::{self, openai as convert_openai};
use crate::error::LlmError;
use crate::events::ErrorListener;
use crate::protocol::openai::OpenAiModelList;
use crate::sse::{self, ChunkCallback, OpenAiStreamDecoder, StreamContext};
use crate::transport::Transport;
use crate::types::{CompletionRequest, CompletionResponse};

/// What distinguishes one OpenAI-compatible vendor from another
#[derive(Debug, Clone, Copy)]
pub struct CompatProfile {
    pub kind: ProviderKind,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    /// Model used to check connectivity
    pub test_model: &'static str,
    /// Whether `/models` entries carry a human-readable `name`
    pub named_models: bool,
}

/// `OpenAI` itself
pub const OPENAI: CompatProfile = CompatProfile {
    kind: ProviderKind::Openai,
    default_base_url: "https://api.openai.com/v1",
    default_model: "gpt-4o-mini",
    test_model: "gpt-4o-mini",
    named_models: false,
};

/// Host that accepts `stream_options`; many compatible servers reject it
const CANONICAL_HOST: &str = "api.openai.com";

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    core: ProviderCore,
    profile: CompatProfile,
}

impl OpenAiProvider {
    /// Create from provider configuration with the given vendor profile
    pub fn new(
        name: String,
        config: &ProviderConfig,
        transport: Arc<dyn Transport>,
        profile: CompatProfile,
    ) -> Result<Self, LlmError> {
        let core = ProviderCore::new(name, config, transport, profile.default_base_url, profile.default_model)?;
        Ok(Self { core, profile })
    }

    /// `OpenAI` provider
    pub fn openai(name: String, config: &ProviderConfig, transport: Arc<dyn Transport>) -> Result<Self, LlmError> {
        Self::new(name, config, transport, OPENAI)
    }

    /// Report failures to `listener`
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.core.set_listener(listener);
        self
    }

    fn is_canonical(&self) -> bool {
        self.core.base_url.host_str() == Some(CANONICAL_HOST)
    }

    fn auth(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, self.core.key_header("Bearer ")?);
        Ok(headers)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let auth = self.auth()?;
        let request = inline_local_files(request).await?;
        let model = self.core.model(&request);

        let mut wire = convert_openai::normalize_request(&request, model, &self.core.base_url, false)?;
        wire.body.stream = None;

        let body = serde_json::to_value(&wire.body).map_err(|e| LlmError::Validation(e.to_string()))?;
        let endpoint = wire.url.to_string();
        let http = self
            .core
            .request(Method::POST, wire.url, auth)
            .json(body)
            .timeout(self.core.timeout_for(&request));

        let value = self.core.execute_json(http).await?;

        if let Some(body) = convert_openai::error_envelope(&value) {
            return Err(LlmError::Upstream {
                provider: self.core.name.clone(),
                endpoint,
                body,
            });
        }

        convert_openai::normalize_response(value, &self.core.name)
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        let auth = self.auth()?;
        let mut streaming = inline_local_files(request).await?.into_owned();
        streaming.stream = true;
        let model = self.core.model(&streaming);

        let wire = convert_openai::normalize_request(&streaming, model, &self.core.base_url, self.is_canonical())?;
        let body = serde_json::to_value(&wire.body).map_err(|e| LlmError::Validation(e.to_string()))?;
        let endpoint = wire.url.to_string();
        let timeout = self.core.timeout_for(&streaming);
        let http = self
            .core
            .request(Method::POST, wire.url, auth)
            .json(body)
            .timeout(timeout);

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
        sse::drive(stream.body, &mut OpenAiStreamDecoder::default(), &ctx, on_chunk).await
    }

    async fn models(&self) -> Result<IndexMap<String, String>, LlmError> {
        let url = convert::endpoint(&self.core.base_url, "models")?;
        let http = self.core.request(Method::GET, url, self.auth()?);

        let value = self.core.execute_json(http).await?;
        let list: OpenAiModelList = serde_json::from_value(value).map_err(|e| LlmError::parse(&self.core.name, e))?;

        let models: IndexMap<String, String> = list
            .data
            .into_iter()
            .map(|m| {
                let display = match m.name {
                    Some(name) if self.profile.named_models => name,
                    _ => m.id.clone(),
                };
                (m.id, display)
            })
            .collect();

        tracing::debug!(provider = %self.core.name, count = models.len(), "discovered models");
        Ok(models)
    }
}

pub(crate) fn cancelled(provider: &str, endpoint: &str) -> LlmError {
    LlmError::Transport {
        provider: provider.to_owned(),
        endpoint: endpoint.to_owned(),
        kind: crate::error::TransportErrorKind::Cancelled,
        message: "cancelled before the stream opened".to_owned(),
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> ProviderKind {
        self.profile.kind
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            file_upload: false,
            model_listing: true,
        }
    }

    fn is_configured(&self) -> bool {
        self.core.is_configured()
    }

    fn default_model(&self) -> &str {
        &self.core.default_model
    }

    fn test_model(&self) -> &str {
        self.profile.test_model
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

    async fn list_models(&self) -> Result<IndexMap<String, String>, LlmError> {
        self.models()
            .await
            .inspect_err(|e| self.core.report(e, "list_models"))
    }
}
