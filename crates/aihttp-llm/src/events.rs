//! Structured error reporting
//!
//! Providers describe every failure as an [`ErrorEvent`] and hand it to an
//! optional [`ErrorListener`] before returning the error to the caller. The
//! listener is how a host persists or forwards diagnostics without parsing
//! error strings.

use serde::Serialize;

use crate::error::LlmError;

/// Diagnostic describing a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorEvent {
    /// Vendor API answered with an error or could not be reached
    Api {
        provider: String,
        endpoint: String,
        /// Response status, absent for transport failures
        http_status: Option<u16>,
        /// Raw response body or transport message
        raw_body: String,
        /// Operation that failed, e.g. `send` or `list_models`
        context: String,
    },
    /// Failure inside this library (normalization, parsing, configuration)
    Library {
        component: String,
        message: String,
        context: String,
    },
}

impl ErrorEvent {
    /// Describe an error raised during `context`
    pub fn from_error(error: &LlmError, context: &str) -> Self {
        match error {
            LlmError::Provider {
                provider,
                endpoint,
                status,
                body,
            } => Self::Api {
                provider: provider.clone(),
                endpoint: endpoint.clone(),
                http_status: Some(status.as_u16()),
                raw_body: body.clone(),
                context: context.to_owned(),
            },
            LlmError::Upstream {
                provider,
                endpoint,
                body,
            } => Self::Api {
                provider: provider.clone(),
                endpoint: endpoint.clone(),
                http_status: None,
                raw_body: body.clone(),
                context: context.to_owned(),
            },
            LlmError::Transport {
                provider,
                endpoint,
                message,
                ..
            } => Self::Api {
                provider: provider.clone(),
                endpoint: endpoint.clone(),
                http_status: None,
                raw_body: message.clone(),
                context: context.to_owned(),
            },
            LlmError::Parse { provider, message } => Self::Library {
                component: format!("{provider} response normalizer"),
                message: message.clone(),
                context: context.to_owned(),
            },
            LlmError::Configuration { provider, message } => Self::Library {
                component: format!("{provider} provider"),
                message: message.clone(),
                context: context.to_owned(),
            },
            other @ (LlmError::Validation(_) | LlmError::ProviderNotFound { .. }) => Self::Library {
                component: "client".to_owned(),
                message: other.to_string(),
                context: context.to_owned(),
            },
        }
    }
}

/// Receiver of error events
pub trait ErrorListener: Send + Sync {
    /// Called once per failed operation, before the error is returned
    fn on_error(&self, event: &ErrorEvent);
}

/// Listener that logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorListener;

impl ErrorListener for TracingErrorListener {
    fn on_error(&self, event: &ErrorEvent) {
        match event {
            ErrorEvent::Api {
                provider,
                endpoint,
                http_status,
                raw_body,
                context,
            } => {
                tracing::warn!(
                    provider = %provider,
                    endpoint = %endpoint,
                    status = ?http_status,
                    context = %context,
                    body = %raw_body,
                    "provider call failed"
                );
            }
            ErrorEvent::Library {
                component,
                message,
                context,
            } => {
                tracing::warn!(component = %component, context = %context, error = %message, "library error");
            }
        }
    }
}
