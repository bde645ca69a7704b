//! DeepSeek chat completions (OpenAI-compatible API).

use super::chat::{ChatEndpoint, ChatSettings};
use super::LlmClient;
use crate::error::Result;
use async_trait::async_trait;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// DeepSeek API client.
#[derive(Clone)]
pub struct DeepSeekClient {
    endpoint: ChatEndpoint,
}

impl DeepSeekClient {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            endpoint: ChatEndpoint::new(settings, "/v1/chat/completions"),
        }
    }

    /// Client for the public API with the default chat model.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new(ChatSettings::new(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL))
    }
}

/// Reasoner models prefix their answer with a `<think>` block.
fn strip_reasoning(content: &str) -> &str {
    match (content.find("<think>"), content.find("</think>")) {
        (Some(start), Some(end)) if start < end => content[end + "</think>".len()..].trim(),
        _ => content.trim(),
    }
}

#[async_trait]
impl LlmClient for DeepSeekClient {
    fn name(&self) -> &str {
        "deepseek"
    }

    fn default_model(&self) -> &str {
        &self.endpoint.settings().model
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let text = self.endpoint.complete(prompt, model).await?;
        Ok(strip_reasoning(&text).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(strip_reasoning("<think>hmm</think>\nAnswer"), "Answer");
        assert_eq!(strip_reasoning("  plain  "), "plain");
        assert_eq!(strip_reasoning("</think> odd <think>"), "</think> odd <think>");
    }

    #[test]
    fn test_defaults() {
        let client = DeepSeekClient::with_api_key("k");
        assert_eq!(client.name(), "deepseek");
        assert_eq!(client.default_model(), DEFAULT_MODEL);
    }
}
