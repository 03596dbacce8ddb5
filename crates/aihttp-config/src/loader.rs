use std::path::Path;

use http::{HeaderName, HeaderValue};
use secrecy::ExposeSecret;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, variable expansion
    /// fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if variable expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or a provider entry
    /// carries an unusable base URL or header
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured under [llm.providers]");
        }

        for (name, provider) in &self.llm.providers {
            if let Some(base_url) = &provider.base_url
                && !matches!(base_url.scheme(), "http" | "https")
            {
                anyhow::bail!("provider '{name}' base_url must use http or https, got '{}'", base_url.scheme());
            }

            for (header, value) in &provider.headers {
                HeaderName::try_from(header.as_str())
                    .map_err(|e| anyhow::anyhow!("provider '{name}' has invalid header name '{header}': {e}"))?;
                HeaderValue::try_from(value.as_str())
                    .map_err(|e| anyhow::anyhow!("provider '{name}' has invalid value for header '{header}': {e}"))?;
            }

            if let Some(timeout) = provider.timeout
                && timeout.is_zero()
            {
                anyhow::bail!("provider '{name}' timeout must be greater than zero");
            }

            let has_key = provider
                .api_key
                .as_ref()
                .is_some_and(|key| !key.expose_secret().trim().is_empty());
            if !has_key {
                tracing::warn!(
                    provider = %name,
                    kind = %provider.kind,
                    "provider has no API key; requests will fail until one is configured"
                );
            }

            if let Some(model) = &provider.default_model
                && model.trim().is_empty()
            {
                anyhow::bail!("provider '{name}' default_model must not be empty");
            }
        }

        Ok(())
    }
}
