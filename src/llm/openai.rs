//! OpenAI chat completions.

use super::chat::{ChatEndpoint, ChatSettings};
use super::LlmClient;
use crate::error::Result;
use async_trait::async_trait;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI API client. Also works with any server exposing the same
/// `/chat/completions` route.
#[derive(Clone)]
pub struct OpenAiClient {
    endpoint: ChatEndpoint,
}

impl OpenAiClient {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            endpoint: ChatEndpoint::new(settings, "/chat/completions"),
        }
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new(ChatSettings::new(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.endpoint.settings().model
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let text = self.endpoint.complete(prompt, model).await?;
        Ok(text.trim().to_string())
    }
}
