use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Errors that can occur during completion operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider is missing credentials or has an unusable configuration
    #[error("provider {provider} is not configured: {message}")]
    Configuration { provider: String, message: String },

    /// Caller sent a request that cannot be normalized
    #[error("invalid request: {0}")]
    Validation(String),

    /// Network failure, timeout or cancellation before a response arrived
    #[error("{kind} calling {provider} at {endpoint}: {message}")]
    Transport {
        provider: String,
        endpoint: String,
        kind: TransportErrorKind,
        message: String,
    },

    /// Provider answered with a non-2xx status
    #[error("{provider} returned {status} from {endpoint}")]
    Provider {
        provider: String,
        endpoint: String,
        status: StatusCode,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// Provider reported an error inside a successful response
    #[error("{provider} reported an error from {endpoint}: {body}")]
    Upstream {
        provider: String,
        endpoint: String,
        body: String,
    },

    /// 2xx body was not the expected shape
    #[error("failed to parse {provider} response: {message}")]
    Parse { provider: String, message: String },

    /// Named provider does not exist in configuration
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },
}

/// Classification of transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established (DNS, TCP, TLS)
    Connect,
    /// Deadline elapsed
    Timeout,
    /// Caller cancelled the operation
    Cancelled,
    /// Connection broke while reading the body
    Body,
    /// Request could not be built or sent
    Request,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connection failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Body => "body read failure",
            Self::Request => "request failure",
        })
    }
}

impl LlmError {
    /// Whether retrying the same call later may succeed
    ///
    /// Transport failures other than cancellation, rate limiting and 5xx
    /// responses qualify. This layer never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => *kind != TransportErrorKind::Cancelled,
            Self::Provider { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
            _ => false,
        }
    }

    /// HTTP status of a provider error
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the operation hit its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            }
        )
    }

    /// Whether the caller cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::Cancelled,
                ..
            }
        )
    }

    pub(crate) fn parse(provider: &str, message: impl fmt::Display) -> Self {
        Self::Parse {
            provider: provider.to_owned(),
            message: message.to_string(),
        }
    }
}
