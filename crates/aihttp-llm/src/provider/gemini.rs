//! Google Gemini provider implementation
//!
//! Local files are uploaded to the Files API before the completion call and
//! referenced by the returned URI. Each distinct path is uploaded once per
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use aihttp_config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::openai::cancelled;
use super::{Provider, ProviderCapabilities, ProviderCore, local_files, with_resolved_files};
use crate::convert::{self, gemini as convert_gemini};
use crate::error::LlmError;
use crate::events::ErrorListener;
use crate::protocol::gemini::{GeminiModelList, GeminiUploadResponse};
use crate::sse::{self, ChunkCallback, GeminiStreamDecoder, StreamContext};
use crate::transport::{RequestBody, Transport};
use crate::types::{CompletionRequest, CompletionResponse, FileRef, FileSource};

/// Default Gemini API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Only models supporting this method are listed
const GENERATE_METHOD: &str = "generateContent";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Model listing stops after this many pages
const MAX_MODEL_PAGES: usize = 50;

/// Google Gemini provider
pub struct GeminiProvider {
    core: ProviderCore,
}

impl GeminiProvider {
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
        headers.insert(HeaderName::from_static(API_KEY_HEADER), self.core.key_header("")?);
        Ok(headers)
    }

    /// Media upload endpoint mirroring the API base path under `/upload`
    fn upload_url(&self) -> Url {
        let mut url = self.core.base_url.clone();
        let base_path = self.core.base_url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("/upload{base_path}/files"));
        url.set_query(Some("uploadType=media"));
        url
    }

    async fn upload(&self, file: &FileRef) -> Result<String, LlmError> {
        let FileSource::Path(path) = &file.source else {
            return Err(convert::unresolved(file));
        };

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| LlmError::Validation(format!("cannot read {}: {e}", path.display())))?;

        let mut http = self.core.request(Method::POST, self.upload_url(), self.auth()?);
        http.headers.insert(
            HeaderName::from_static("x-goog-upload-protocol"),
            HeaderValue::from_static("raw"),
        );
        http.body = RequestBody::Bytes {
            data: Bytes::from(data),
            content_type: file.mime_type.clone(),
        };

        let value = self.core.execute_json(http).await?;
        let uploaded: GeminiUploadResponse =
            serde_json::from_value(value).map_err(|e| LlmError::parse(&self.core.name, e))?;

        tracing::debug!(provider = %self.core.name, path = %path.display(), uri = %uploaded.file.uri, "uploaded file");
        Ok(uploaded.file.uri)
    }

    /// Upload every local file once and point the request at the results
    async fn resolve_files(&self, request: &CompletionRequest) -> Result<CompletionRequest, LlmError> {
        let mut resolved = HashMap::new();

        for file in local_files(request) {
            if let FileSource::Path(path) = &file.source {
                let uri = self.upload(file).await?;
                resolved.insert(path.clone(), FileSource::Uri(uri));
            }
        }

        if resolved.is_empty() {
            return Ok(request.clone());
        }
        Ok(with_resolved_files(request, &resolved))
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let auth = self.auth()?;
        let mut request = self.resolve_files(request).await?;
        request.stream = false;
        let model = self.core.model(&request);

        let wire = convert_gemini::normalize_request(&request, model, &self.core.base_url)?;
        let body = serde_json::to_value(&wire.body).map_err(|e| LlmError::Validation(e.to_string()))?;
        let http = self
            .core
            .request(Method::POST, wire.url, auth)
            .json(body)
            .timeout(self.core.timeout_for(&request));

        let value = self.core.execute_json(http).await?;
        convert_gemini::normalize_response(value, &self.core.name, convert_gemini::bare_model(model))
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        let auth = self.auth()?;
        let mut request = self.resolve_files(request).await?;
        request.stream = true;
        let model = self.core.model(&request);

        let wire = convert_gemini::normalize_request(&request, model, &self.core.base_url)?;
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
            model: convert_gemini::bare_model(model),
            cancel,
            idle_timeout: timeout,
        };
        sse::drive(stream.body, &mut GeminiStreamDecoder::default(), &ctx, on_chunk).await
    }

    async fn models(&self) -> Result<IndexMap<String, String>, LlmError> {
        let mut models = IndexMap::new();
        let mut page_token: Option<String> = None;

        for page_number in 1..=MAX_MODEL_PAGES {
            let mut url = convert::endpoint(&self.core.base_url, "models")?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let value = self
                .core
                .execute_json(self.core.request(Method::GET, url, self.auth()?))
                .await?;
            let page: GeminiModelList =
                serde_json::from_value(value).map_err(|e| LlmError::parse(&self.core.name, e))?;

            for model in page.models {
                if !model.supported_generation_methods.iter().any(|m| m == GENERATE_METHOD) {
                    continue;
                }
                let id = convert_gemini::bare_model(&model.name).to_owned();
                let display = model.display_name.unwrap_or_else(|| id.clone());
                models.insert(id, display);
            }

            match page.next_page_token {
                Some(token) if page_token.as_ref() == Some(&token) => {
                    tracing::warn!(provider = %self.core.name, token = %token, "model listing repeated its page token");
                    break;
                }
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }

            if page_number == MAX_MODEL_PAGES {
                tracing::warn!(provider = %self.core.name, pages = MAX_MODEL_PAGES, "model listing truncated");
            }
        }

        tracing::debug!(provider = %self.core.name, count = models.len(), "discovered models");
        Ok(models)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            file_upload: true,
            model_listing: true,
        }
    }

    fn is_configured(&self) -> bool {
        self.core.is_configured()
    }

    fn default_model(&self) -> &str {
        &self.core.default_model
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
