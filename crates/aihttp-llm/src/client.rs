//! Client facade routing requests to configured providers by name

use std::collections::HashMap;
use std::sync::Arc;

use aihttp_config::{LlmConfig, ProviderConfig, ProviderKind};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::events::{ErrorEvent, ErrorListener};
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::gemini::GeminiProvider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::{ConnectionTest, Provider, grok, openrouter};
use crate::sse::ChunkCallback;
use crate::tools::ToolRegistry;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{CompletionRequest, CompletionResponse};

/// Builds a provider from its configuration
pub type ProviderFactory = fn(
    name: String,
    config: &ProviderConfig,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
) -> Result<Arc<dyn Provider>, LlmError>;

/// Maps each provider kind to the constructor for it
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ProviderKind::Openai, build_openai);
        registry.register(ProviderKind::Anthropic, build_anthropic);
        registry.register(ProviderKind::Gemini, build_gemini);
        registry.register(ProviderKind::Grok, build_grok);
        registry.register(ProviderKind::Openrouter, build_openrouter);
        registry
    }

    /// Register or replace the constructor for `kind`
    pub fn register(&mut self, kind: ProviderKind, factory: ProviderFactory) {
        self.factories.insert(kind, factory);
    }

    /// Construct a provider, failing if its kind has no constructor
    pub fn build(
        &self,
        name: &str,
        config: &ProviderConfig,
        transport: Arc<dyn Transport>,
        listener: Option<Arc<dyn ErrorListener>>,
    ) -> Result<Arc<dyn Provider>, LlmError> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| LlmError::Configuration {
            provider: name.to_owned(),
            message: format!("no constructor registered for provider type '{}'", config.kind),
        })?;
        factory(name.to_owned(), config, transport, listener)
    }
}

fn attach<P: Provider + 'static>(
    provider: Result<P, LlmError>,
    listener: Option<Arc<dyn ErrorListener>>,
    with_listener: fn(P, Arc<dyn ErrorListener>) -> P,
) -> Result<Arc<dyn Provider>, LlmError> {
    let provider = provider?;
    Ok(match listener {
        Some(listener) => Arc::new(with_listener(provider, listener)),
        None => Arc::new(provider),
    })
}

fn build_openai(
    name: String,
    config: &ProviderConfig,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
) -> Result<Arc<dyn Provider>, LlmError> {
    attach(
        OpenAiProvider::openai(name, config, transport),
        listener,
        OpenAiProvider::with_listener,
    )
}

fn build_anthropic(
    name: String,
    config: &ProviderConfig,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
) -> Result<Arc<dyn Provider>, LlmError> {
    attach(
        AnthropicProvider::new(name, config, transport),
        listener,
        AnthropicProvider::with_listener,
    )
}

fn build_gemini(
    name: String,
    config: &ProviderConfig,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
) -> Result<Arc<dyn Provider>, LlmError> {
    attach(GeminiProvider::new(name, config, transport), listener, GeminiProvider::with_listener)
}

fn build_grok(
    name: String,
    config: &ProviderConfig,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
) -> Result<Arc<dyn Provider>, LlmError> {
    attach(grok::new(name, config, transport), listener, OpenAiProvider::with_listener)
}

fn build_openrouter(
    name: String,
    config: &ProviderConfig,
    transport: Arc<dyn Transport>,
    listener: Option<Arc<dyn ErrorListener>>,
) -> Result<Arc<dyn Provider>, LlmError> {
    attach(openrouter::new(name, config, transport), listener, OpenAiProvider::with_listener)
}

/// Unified entry point over every configured provider
///
/// Registered tools are attached to requests that carry none of their own.
pub struct LlmClient {
    providers: IndexMap<String, Arc<dyn Provider>>,
    tools: ToolRegistry,
    listener: Option<Arc<dyn ErrorListener>>,
}

impl LlmClient {
    /// Build a client with the built-in providers and a `reqwest` transport
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::from_config_with(
            config,
            &ProviderRegistry::with_defaults(),
            &(Arc::new(ReqwestTransport::new()) as Arc<dyn Transport>),
            None,
        )
    }

    /// Build a client from explicit parts
    ///
    /// `listener` receives an [`ErrorEvent`] for every failed operation.
    pub fn from_config_with(
        config: &LlmConfig,
        registry: &ProviderRegistry,
        transport: &Arc<dyn Transport>,
        listener: Option<Arc<dyn ErrorListener>>,
    ) -> Result<Self, LlmError> {
        let mut providers = IndexMap::new();

        for (name, provider_config) in &config.providers {
            if name.trim().is_empty() {
                return Err(LlmError::Configuration {
                    provider: name.clone(),
                    message: "provider name must not be empty".to_owned(),
                });
            }

            let provider = registry.build(name, provider_config, Arc::clone(transport), listener.clone())?;
            if !provider.is_configured() {
                tracing::warn!(provider = %name, kind = %provider_config.kind, "provider has no API key; requests will fail");
            }
            providers.insert(name.clone(), provider);
        }

        tracing::info!(count = providers.len(), "initialized providers");

        Ok(Self {
            providers,
            tools: ToolRegistry::new(),
            listener,
        })
    }

    /// Provider registered under `name`
    pub fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, LlmError> {
        self.providers.get(name).cloned().ok_or_else(|| {
            let error = LlmError::ProviderNotFound {
                provider: name.to_owned(),
            };
            if let Some(listener) = &self.listener {
                listener.on_error(&ErrorEvent::from_error(&error, "provider lookup"));
            }
            error
        })
    }

    /// Configured provider names in declaration order
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// Send a non-streaming completion through `provider`
    pub async fn send(&self, provider: &str, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let target = self.provider(provider)?;
        let request = self.with_tools(request);
        target.send(&request).await
    }

    /// Stream a completion through `provider`
    pub async fn send_streaming(
        &self,
        provider: &str,
        request: &CompletionRequest,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        self.send_streaming_with_cancel(provider, request, &CancellationToken::new(), on_chunk)
            .await
    }

    /// Stream a completion through `provider` until it ends or `cancel` fires
    pub async fn send_streaming_with_cancel(
        &self,
        provider: &str,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        on_chunk: &mut ChunkCallback<'_>,
    ) -> Result<CompletionResponse, LlmError> {
        let target = self.provider(provider)?;
        let request = self.with_tools(request);
        target.send_streaming_with_cancel(&request, cancel, on_chunk).await
    }

    /// Models offered by `provider`, id to display name
    pub async fn list_models(&self, provider: &str) -> Result<IndexMap<String, String>, LlmError> {
        self.provider(provider)?.list_models().await
    }

    /// Probe `provider` with a minimal request
    pub async fn test_connection(&self, provider: &str) -> Result<ConnectionTest, LlmError> {
        Ok(self.provider(provider)?.test_connection().await)
    }

    fn with_tools(&self, request: &CompletionRequest) -> CompletionRequest {
        let mut request = request.clone();
        if request.tools.is_none() && !self.tools.is_empty() {
            request.tools = Some(self.tools.definitions());
        }
        request
    }
}
