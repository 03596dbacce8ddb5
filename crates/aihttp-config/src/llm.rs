use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use url::Url;

/// Provider configurations keyed by the name callers route with
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Providers in declaration order
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
}

/// Configuration for a single provider instance
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol spoken by this provider
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override, e.g. a self-hosted OpenAI-compatible gateway
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model used when a request does not name one
    #[serde(default)]
    pub default_model: Option<String>,
    /// Per-request timeout (e.g. "30s", "2m")
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
    /// Static headers added to every request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl ProviderConfig {
    /// Create an empty configuration for the given provider kind
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
            default_model: None,
            timeout: None,
            headers: IndexMap::new(),
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set the fallback model
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a static header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Supported provider protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI Chat Completions
    Openai,
    /// Anthropic Messages
    Anthropic,
    /// Google Gemini `generateContent`
    Gemini,
    /// X.AI Grok, OpenAI-compatible
    Grok,
    /// OpenRouter, OpenAI-compatible
    Openrouter,
}

impl ProviderKind {
    /// All provider kinds
    pub const ALL: [Self; 5] = [Self::Openai, Self::Anthropic, Self::Gemini, Self::Grok, Self::Openrouter];

    /// Configuration name of this kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Grok => "grok",
            Self::Openrouter => "openrouter",
        }
    }

    /// Whether this provider speaks the OpenAI chat completions protocol
    pub const fn is_openai_compatible(self) -> bool {
        matches!(self, Self::Openai | Self::Grok | Self::Openrouter)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider type: {s}"))
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    duration_str::parse(&raw)
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("OpenRouter".parse::<ProviderKind>().unwrap(), ProviderKind::Openrouter);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("bedrock".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn openai_family_membership() {
        assert!(ProviderKind::Grok.is_openai_compatible());
        assert!(ProviderKind::Openrouter.is_openai_compatible());
        assert!(!ProviderKind::Anthropic.is_openai_compatible());
        assert!(!ProviderKind::Gemini.is_openai_compatible());
    }

    #[test]
    fn timeout_accepts_human_durations() {
        let config: ProviderConfig = toml::from_str(
            r#"
            type = "anthropic"
            timeout = "90s"
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let result = toml::from_str::<ProviderConfig>(
            r#"
            type = "openai"
            timeout = "soon"
            "#,
        );

        assert!(result.is_err());
    }
}
