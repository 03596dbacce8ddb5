//! HTTP transport seam
//!
//! Providers build [`HttpRequest`]s and hand them to a [`Transport`]. The
//! default implementation wraps `reqwest`; tests and hosts can substitute
//! their own.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::error::TransportErrorKind;

/// Failure below the HTTP status line
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outgoing request body
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Bytes { data: Bytes, content_type: String },
}

/// Request handed to a transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Deadline for the whole exchange; for streams, until headers arrive
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Fully buffered response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    /// Body as lossy UTF-8, for diagnostics
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Response whose body is read incrementally
pub struct HttpStream {
    pub status: StatusCode,
    pub body: BoxStream<'static, Result<Bytes, TransportFailure>>,
}

/// Upper bound for draining an error body when the request sets no timeout
pub const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpStream {
    /// Drain the body, used for non-2xx responses
    ///
    /// Stops at `limit` and returns what arrived so far.
    pub async fn collect_text(mut self, limit: Duration) -> String {
        let deadline = tokio::time::Instant::now() + limit;
        let mut buf = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.body.next()).await {
                Ok(Some(Ok(chunk))) => buf.extend_from_slice(&chunk),
                Ok(Some(Err(_)) | None) => break,
                Err(_) => {
                    tracing::debug!(status = %self.status, "error body not complete before deadline");
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Sends HTTP requests; knows nothing about vendor protocols
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the full response body
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure>;

    /// Send a request and return the body as a byte stream
    async fn stream(&self, request: HttpRequest) -> Result<HttpStream, TransportFailure>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing client (shared pool, proxy settings, ...)
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes { data, content_type } => {
                builder.header(http::header::CONTENT_TYPE, content_type).body(data)
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let timeout = request.timeout;
        let mut builder = self.build(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;

        Ok(HttpResponse { status, body })
    }

    async fn stream(&self, request: HttpRequest) -> Result<HttpStream, TransportFailure> {
        let timeout = request.timeout;
        let send = self.build(request).send();

        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| TransportFailure::new(TransportErrorKind::Timeout, "no response headers before deadline"))?,
            None => send.await,
        }
        .map_err(classify)?;

        let status = response.status();
        let body = response.bytes_stream().map(|r| r.map_err(classify)).boxed();

        Ok(HttpStream { status, body })
    }
}

fn classify(error: reqwest::Error) -> TransportFailure {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Request
    };

    TransportFailure::new(kind, error.to_string())
}
