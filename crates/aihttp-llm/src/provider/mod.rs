//! Provider trait and implementations for the vendor APIs

pub mod anthropic;
pub mod gemini;
pub mod grok;
pub mod openai;
pub mod openrouter;

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aihttp_config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::convert::parse_json;
use crate::error::LlmError;
use crate::events::{ErrorEvent, ErrorListener};
use crate::sse::ChunkCallback;
use crate::transport::{ERROR_BODY_TIMEOUT, HttpRequest, HttpStream, Transport, TransportFailure};
use crate::types::{CompletionRequest, CompletionResponse, Content, ContentPart, FileRef, FileSource, Message};

/// Largest completion requested by [`Provider::test_connection`]
const PROBE_MAX_TOKENS: u32 = 5;

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub tool_calling: bool,
    /// Whether local files are uploaded rather than inlined
    pub file_upload: bool,
    /// Whether `list_models` queries the vendor
    pub model_listing: bool,
}

/// Outcome of [`Provider::test_connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

/// One configured vendor endpoint
///
/// Implementations hold only immutable state and are shared as
/// `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured name callers route with
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Whether an API key is present
    fn is_configured(&self) -> bool;

    /// Model used when a request names none
    fn default_model(&self) -> &str;

    /// Cheapest model, used by [`Provider::test_connection`]
    fn test_model(&self) -> &str {
        self.default_model()
    }

    /// Send a non-streaming completion request
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Stream a completion, invoking `on_chunk` for every chunk
    async fn send_streaming(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        self.send_streaming_with_cancel(request, &CancellationToken::new(), on_chunk)
            .await
    }

    /// Stream a completion until it ends or `cancel` fires
    async fn send_streaming_with_cancel(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError>;

    /// Available models as id to display name
    async fn list_models(&self) -> Result<IndexMap<String, String>, LlmError>;

    /// Send a minimal real request; never fails
    async fn test_connection(&self) -> ConnectionTest {
        let model = self.test_model().to_owned();
        let request = CompletionRequest::new(vec![Message::user("Hi")])
            .with_model(model.clone())
            .with_max_tokens(PROBE_MAX_TOKENS);

        match self.send(&request).await {
            Ok(_) => ConnectionTest {
                success: true,
                message: format!("connected to {} using {model}", self.name()),
            },
            Err(e) => ConnectionTest {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// State and plumbing shared by every provider implementation
pub(crate) struct ProviderCore {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: Url,
    pub default_model: String,
    timeout: Option<Duration>,
    api_key: Option<SecretString>,
    headers: HeaderMap,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
}

impl ProviderCore {
    pub fn new(
        name: String,
        config: &ProviderConfig,
        transport: Arc<dyn Transport>,
        default_base_url: &str,
        default_model: &str,
    ) -> Result<Self, LlmError> {
        let configuration = |message: String| LlmError::Configuration {
            provider: name.clone(),
            message,
        };

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(default_base_url).map_err(|e| configuration(format!("invalid default base URL: {e}")))?,
        };

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let header_name =
                HeaderName::try_from(key.as_str()).map_err(|e| configuration(format!("invalid header name {key}: {e}")))?;
            let header_value =
                HeaderValue::try_from(value.as_str()).map_err(|e| configuration(format!("invalid value for {key}: {e}")))?;
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            kind: config.kind,
            base_url,
            default_model: config.default_model.clone().unwrap_or_else(|| default_model.to_owned()),
            timeout: config.timeout,
            api_key: config.api_key.clone().filter(|k| !k.expose_secret().trim().is_empty()),
            headers,
            transport,
            listener: None,
            name,
        })
    }

    pub fn set_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.listener = Some(listener);
    }

    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// API key as a sensitive header value
    pub fn key_header(&self, prefix: &str) -> Result<HeaderValue, LlmError> {
        let key = self.api_key.as_ref().ok_or_else(|| LlmError::Configuration {
            provider: self.name.clone(),
            message: "API key is not set".to_owned(),
        })?;

        let mut value =
            HeaderValue::try_from(format!("{prefix}{}", key.expose_secret())).map_err(|_| LlmError::Configuration {
                provider: self.name.clone(),
                message: "API key contains characters not allowed in a header".to_owned(),
            })?;
        value.set_sensitive(true);
        Ok(value)
    }

    pub fn model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model_or(&self.default_model)
    }

    pub fn timeout_for(&self, request: &CompletionRequest) -> Option<Duration> {
        request.timeout.or(self.timeout)
    }

    /// Request carrying the configured static headers plus `auth`
    pub fn request(&self, method: Method, url: Url, auth: HeaderMap) -> HttpRequest {
        HttpRequest::new(method, url)
            .headers(self.headers.clone())
            .headers(auth)
            .timeout(self.timeout)
    }

    /// Send and return the 2xx body as JSON
    pub async fn execute_json(&self, request: HttpRequest) -> Result<Value, LlmError> {
        let endpoint = request.url.to_string();
        tracing::debug!(provider = %self.name, method = %request.method, endpoint = %endpoint, "dispatching request");

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|failure| self.transport_error(&endpoint, failure))?;

        if !response.status.is_success() {
            return Err(self.status_error(&endpoint, response.status, response.text()));
        }

        parse_json(&response.body, &self.name)
    }

    /// Send and return the 2xx body as a byte stream
    pub async fn open_stream(&self, request: HttpRequest) -> Result<HttpStream, LlmError> {
        let endpoint = request.url.to_string();
        let drain_limit = request.timeout.unwrap_or(ERROR_BODY_TIMEOUT);
        tracing::debug!(provider = %self.name, endpoint = %endpoint, "opening stream");

        let stream = self
            .transport
            .stream(request)
            .await
            .map_err(|failure| self.transport_error(&endpoint, failure))?;

        if !stream.status.is_success() {
            let status = stream.status;
            let body = stream.collect_text(drain_limit).await;
            return Err(self.status_error(&endpoint, status, body));
        }

        Ok(stream)
    }

    fn transport_error(&self, endpoint: &str, failure: TransportFailure) -> LlmError {
        tracing::error!(provider = %self.name, endpoint = %endpoint, error = %failure, "upstream request failed");
        LlmError::Transport {
            provider: self.name.clone(),
            endpoint: endpoint.to_owned(),
            kind: failure.kind,
            message: failure.message,
        }
    }

    fn status_error(&self, endpoint: &str, status: http::StatusCode, body: String) -> LlmError {
        tracing::warn!(provider = %self.name, status = %status, "upstream returned error");
        LlmError::Provider {
            provider: self.name.clone(),
            endpoint: endpoint.to_owned(),
            status,
            body,
        }
    }

    /// Hand a failure to the error listener
    pub fn report(&self, error: &LlmError, context: &str) {
        if let Some(listener) = &self.listener {
            listener.on_error(&ErrorEvent::from_error(error, context));
        }
    }
}

/// Local files referenced by a request, first occurrence of each path only
pub(crate) fn local_files(request: &CompletionRequest) -> Vec<&FileRef> {
    let mut seen = Vec::new();
    let mut files = Vec::new();

    for file in request.messages.iter().flat_map(|m| m.content.files()) {
        if let FileSource::Path(path) = &file.source
            && !seen.contains(&path)
        {
            seen.push(path);
            files.push(file);
        }
    }

    files
}

/// Copy of `request` with local paths replaced by their resolved sources
pub(crate) fn with_resolved_files(
    request: &CompletionRequest,
    resolved: &HashMap<PathBuf, FileSource>,
) -> CompletionRequest {
    let mut request = request.clone();

    for message in &mut request.messages {
        if let Content::Parts(parts) = &mut message.content {
            for part in parts {
                if let ContentPart::File { file } = part
                    && let FileSource::Path(path) = &file.source
                    && let Some(source) = resolved.get(path)
                {
                    file.source = source.clone();
                }
            }
        }
    }

    request
}

/// Replace local paths with base64 data read from disk
pub(crate) async fn inline_local_files(request: &CompletionRequest) -> Result<Cow<'_, CompletionRequest>, LlmError> {
    let files = local_files(request);
    if files.is_empty() {
        return Ok(Cow::Borrowed(request));
    }

    let mut resolved = HashMap::new();
    for file in files {
        if let FileSource::Path(path) = &file.source {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| LlmError::Validation(format!("cannot read {}: {e}", path.display())))?;
            resolved.insert(path.clone(), FileSource::Data(STANDARD.encode(bytes)));
        }
    }

    Ok(Cow::Owned(with_resolved_files(request, &resolved)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn pdf_request(path: &std::path::Path) -> CompletionRequest {
        CompletionRequest::new(vec![
            Message::new(
                crate::types::Role::User,
                vec![
                    ContentPart::file(FileSource::Path(path.to_owned()), "application/pdf"),
                    ContentPart::text("and again"),
                    ContentPart::file(FileSource::Path(path.to_owned()), "application/pdf"),
                ],
            ),
            Message::user("plain"),
        ])
    }

    #[test]
    fn local_files_are_deduplicated() {
        let request = pdf_request(std::path::Path::new("/tmp/report.pdf"));
        assert_eq!(local_files(&request).len(), 1);
    }

    #[tokio::test]
    async fn inline_reads_and_encodes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hi").unwrap();

        let request = pdf_request(file.path());
        let inlined = inline_local_files(&request).await.unwrap();

        let sources: Vec<_> = inlined.messages[0].content.files().map(|f| f.source.clone()).collect();
        assert_eq!(
            sources,
            vec![FileSource::Data("aGk=".to_owned()), FileSource::Data("aGk=".to_owned())]
        );
    }

    #[tokio::test]
    async fn requests_without_files_are_borrowed() {
        let request = CompletionRequest::new(vec![Message::user("hi")]);
        assert!(matches!(inline_local_files(&request).await.unwrap(), Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn missing_file_is_validation_error() {
        let request = pdf_request(std::path::Path::new("/nonexistent/aihttp/report.pdf"));
        let err = inline_local_files(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::Validation(_)));
    }

    #[test]
    fn blank_api_key_is_not_configured() {
        let config = ProviderConfig::new(ProviderKind::Openai).with_api_key("  ");
        let core = ProviderCore::new(
            "openai".to_owned(),
            &config,
            Arc::new(crate::transport::ReqwestTransport::new()),
            "https://api.openai.com/v1",
            "gpt-4o-mini",
        )
        .unwrap();

        assert!(!core.is_configured());
        assert!(matches!(core.key_header("Bearer "), Err(LlmError::Configuration { .. })));
    }

    #[test]
    fn invalid_static_header_is_configuration_error() {
        let config = ProviderConfig::new(ProviderKind::Openrouter).with_header("bad header", "x");
        let result = ProviderCore::new(
            "openrouter".to_owned(),
            &config,
            Arc::new(crate::transport::ReqwestTransport::new()),
            "https://openrouter.ai/api/v1",
            "openai/gpt-4o-mini",
        );

        assert!(matches!(result, Err(LlmError::Configuration { .. })));
    }
}
