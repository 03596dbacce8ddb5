//! X.AI Grok, served through the OpenAI-compatible provider

use std::sync::Arc;

use aihttp_config::{ProviderConfig, ProviderKind};

use super::openai::{CompatProfile, OpenAiProvider};
use crate::error::LlmError;
use crate::transport::Transport;

pub const GROK: CompatProfile = CompatProfile {
    kind: ProviderKind::Grok,
    default_base_url: "https://api.x.ai/v1",
    default_model: "grok-3-mini",
    test_model: "grok-3-mini",
    named_models: false,
};

/// Create a Grok provider
pub fn new(name: String, config: &ProviderConfig, transport: Arc<dyn Transport>) -> Result<OpenAiProvider, LlmError> {
    OpenAiProvider::new(name, config, transport, GROK)
}
