//! OpenAI-style chat completion plumbing shared by the HTTP providers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and sampling settings for a chat-completions provider.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// API key sent as a bearer token
    pub api_key: String,
    /// Base URL of the API, without a trailing slash
    pub base_url: String,
    /// Default model for this provider
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Temperature for LLM sampling
    pub temperature: Option<f32>,
    /// Maximum tokens for LLM response
    pub max_tokens: Option<u32>,
    /// System message sent before every prompt
    pub system: Option<String>,
}

impl ChatSettings {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: Duration::from_secs(120),
            temperature: Some(0.7),
            max_tokens: Some(4096),
            system: None,
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Set the max tokens.
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Remove the max tokens limit (let the model use its default).
    pub fn no_max_tokens(mut self) -> Self {
        self.max_tokens = None;
        self
    }

    /// Set a system message.
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking HTTP endpoint for one provider.
#[derive(Clone)]
pub(crate) struct ChatEndpoint {
    agent: ureq::Agent,
    url: String,
    settings: ChatSettings,
}

impl ChatEndpoint {
    pub(crate) fn new(settings: ChatSettings, path: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .build()
            .into();
        Self {
            agent,
            url: format!("{}{}", settings.base_url, path),
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    fn request(&self, prompt: &str, model: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.settings.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        ChatRequest {
            model: model.to_string(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        }
    }

    fn send(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .agent
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .send_json(request);

        match response {
            Ok(mut resp) => {
                let data: ChatResponse = resp
                    .body_mut()
                    .read_json()
                    .map_err(|e| Error::LlmUnavailable(format!("Error parsing response: {}", e)))?;
                data.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| Error::LlmUnavailable("response has no choices".to_string()))
            }
            Err(ureq::Error::StatusCode(429)) => {
                Err(Error::LlmRateLimited(format!("{} returned HTTP 429", self.url)))
            }
            Err(ureq::Error::StatusCode(code)) => {
                Err(Error::LlmUnavailable(format!("HTTP error {}", code)))
            }
            Err(ureq::Error::Timeout(t)) => {
                Err(Error::LlmUnavailable(format!("request timed out: {:?}", t)))
            }
            Err(e) => Err(Error::LlmUnavailable(format!("Request error: {}", e))),
        }
    }

    /// Run one completion on the blocking pool.
    pub(crate) async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let request = self.request(prompt, model);
        let endpoint = self.clone();
        tokio::task::spawn_blocking(move || endpoint.send(&request))
            .await
            .map_err(|e| Error::LlmUnavailable(format!("completion task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_includes_system_message() {
        let settings = ChatSettings::new("key", "https://api.example.com/", "m").system("be brief");
        let endpoint = ChatEndpoint::new(settings, "/chat/completions");
        assert_eq!(endpoint.url, "https://api.example.com/chat/completions");

        let request = endpoint.request("hello", "other-model");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "other-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_no_max_tokens_is_omitted() {
        let settings = ChatSettings::new("key", "https://x", "m").no_max_tokens();
        let endpoint = ChatEndpoint::new(settings, "/v1/chat/completions");
        let json = serde_json::to_value(endpoint.request("p", "m")).unwrap();
        assert!(json.get("max_tokens").is_none());
    }
}
