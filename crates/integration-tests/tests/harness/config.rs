//! Programmatic configuration builder for integration tests

use aihttp_config::{LlmConfig, ProviderConfig, ProviderKind};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: LlmConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LlmConfig::default(),
        }
    }

    /// Add a provider of `kind` pointed at a mock backend
    pub fn with_provider(mut self, name: &str, kind: ProviderKind, base_url: &str) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig::new(kind)
                .with_api_key("test-key")
                .with_base_url(base_url.parse().expect("valid URL")),
        );
        self
    }

    /// Add a provider with no API key
    pub fn with_unkeyed_provider(mut self, name: &str, kind: ProviderKind, base_url: &str) -> Self {
        self.config.providers.insert(
            name.to_owned(),
            ProviderConfig::new(kind).with_base_url(base_url.parse().expect("valid URL")),
        );
        self
    }

    pub fn build(self) -> LlmConfig {
        self.config
    }
}
