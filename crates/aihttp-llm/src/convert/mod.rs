//! Conversion between unified types and vendor wire formats
//!
//! Pure transforms without I/O. Request normalizers expect every local file
//! to be resolved already (uploaded or inlined by the provider) and reject
//! leftover paths. Response normalizers substitute zero, empty or
//! `unknown` for optional fields the vendor left out.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde_json::Value;
use url::Url;

use crate::error::LlmError;
use crate::types::{CompletionRequest, FileRef, FileSource};

/// Vendor payload together with the URL it must be sent to
#[derive(Debug, Clone)]
pub struct WireRequest<T> {
    pub url: Url,
    pub body: T,
}

/// Append `path` to a base URL, keeping any base path segments
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, LlmError> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| LlmError::Validation(format!("invalid endpoint {joined}: {e}")))
}

/// Vendors that carry the system prompt out of band need at least one turn
pub(crate) fn require_conversation(request: &CompletionRequest) -> Result<(), LlmError> {
    if request.conversation().next().is_none() {
        return Err(LlmError::Validation("at least one non-system message is required".to_owned()));
    }
    Ok(())
}

pub(crate) fn clamp(value: Option<f64>, min: f64, max: f64) -> Option<f64> {
    value.map(|v| v.clamp(min, max))
}

/// Decode a 2xx body as JSON
pub(crate) fn parse_json(body: &[u8], provider: &str) -> Result<Value, LlmError> {
    serde_json::from_slice(body).map_err(|e| LlmError::parse(provider, format!("body is not JSON: {e}")))
}

pub(crate) fn data_uri(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}

pub(crate) fn unresolved(file: &FileRef) -> LlmError {
    let path = match &file.source {
        FileSource::Path(path) => path.display().to_string(),
        FileSource::Uri(uri) => uri.clone(),
        FileSource::Data(_) => "<inline>".to_owned(),
    };
    LlmError::Validation(format!("file {path} was not resolved before normalization"))
}
