//! Language-model providers.
//!
//! Every provider implements [`LlmClient`]: one prompt in, generated text
//! out, no state kept between calls. The pipeline talks to providers through
//! an [`LlmRouter`], which holds a primary client and an optional secondary
//! one and picks between them per call.

mod chat;
pub mod deepseek;
pub mod openai;

pub use chat::ChatSettings;
pub use deepseek::DeepSeekClient;
pub use openai::OpenAiClient;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A text-completion capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short provider name for logs ("deepseek", "openai", ...).
    fn name(&self) -> &str;

    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Complete `prompt` with `model` and return the generated text.
    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;
}

/// Which configured provider a call should go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Primary,
    Secondary,
}

/// Dispatches completions to the primary or secondary provider.
#[derive(Clone)]
pub struct LlmRouter {
    primary: Arc<dyn LlmClient>,
    secondary: Option<Arc<dyn LlmClient>>,
}

impl LlmRouter {
    pub fn new(primary: Arc<dyn LlmClient>) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn LlmClient>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Resolve `provider` to a configured client.
    pub fn client(&self, provider: Provider) -> Result<&Arc<dyn LlmClient>> {
        match provider {
            Provider::Primary => Ok(&self.primary),
            Provider::Secondary => self
                .secondary
                .as_ref()
                .ok_or_else(|| Error::Config("no secondary LLM provider configured".to_string())),
        }
    }

    /// Complete `prompt` on `provider`. An empty `model` selects the
    /// provider's default model.
    pub async fn complete(&self, prompt: &str, provider: Provider, model: &str) -> Result<String> {
        let client = self.client(provider)?;
        let model = if model.is_empty() {
            client.default_model()
        } else {
            model
        };

        tracing::debug!(
            provider = client.name(),
            model,
            prompt_chars = prompt.len(),
            "LLM request"
        );
        let text = client.complete(prompt, model).await?;
        tracing::debug!(provider = client.name(), response_chars = text.len(), "LLM response");
        Ok(text)
    }

    /// Human-readable description of the configured providers.
    pub fn describe(&self) -> String {
        let primary = format!("{} ({})", self.primary.name(), self.primary.default_model());
        match &self.secondary {
            Some(s) => format!("{}, secondary {} ({})", primary, s.name(), s.default_model()),
            None => primary,
        }
    }
}
