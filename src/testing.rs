//! Scripted providers for tests.

use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::search::{bound_results, SearchClient};
use crate::state::SearchResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type LlmResponder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;
type SearchResponder = Box<dyn Fn(&str) -> Result<Vec<SearchResult>> + Send + Sync>;

/// An LLM that answers from a script or a prompt-inspecting closure and
/// records every call.
pub struct MockLlm {
    script: Mutex<VecDeque<Result<String>>>,
    responder: Option<LlmResponder>,
    prompts: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
}

impl MockLlm {
    /// Answer calls with `replies` in order.
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Self {
        Self::scripted(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// Answer calls with `replies` (including failures) in order.
    pub fn scripted(replies: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `f(prompt)`.
    pub fn responding<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::scripted(Vec::new())
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.models.lock().unwrap().push(model.to_string());

        if let Some(responder) = &self.responder {
            return responder(prompt);
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::LlmUnavailable("script exhausted".to_string())))
    }
}

/// A search provider driven by a closure; records every query.
pub struct MockSearch {
    responder: SearchResponder,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn responding<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<SearchResult>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(f),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Return a copy of `results` for every query.
    pub fn always(results: Vec<SearchResult>) -> Self {
        Self::responding(move |_| Ok(results.clone()))
    }

    /// Return one result whose URL and content derive from the query.
    pub fn echo() -> Self {
        Self::responding(|query| {
            Ok(vec![SearchResult::new(
                query,
                format!("https://example.com/{}", query.replace(' ', "-")),
                format!("About {}", query),
                format!("Evidence about {}. It grew 12% in 2024.", query),
            )])
        })
    }

    /// Never find anything.
    pub fn empty() -> Self {
        Self::responding(|_| Ok(Vec::new()))
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchClient for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_content_length: usize,
    ) -> Result<Vec<SearchResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        let results = (self.responder)(query)?;
        Ok(bound_results(results, max_results, max_content_length))
    }
}

/// Planner reply listing `titles`.
pub fn outline_reply(title: &str, titles: &[&str]) -> String {
    let sections: Vec<serde_json::Value> = titles
        .iter()
        .map(|t| serde_json::json!({"title": t, "intent": format!("Explain {}", t)}))
        .collect();
    format!(
        "<outline>{}</outline>",
        serde_json::json!({"title": title, "sections": sections})
    )
}

/// Reflection reply.
pub fn reflection_reply(sufficient: bool, next_query: Option<&str>) -> String {
    format!(
        "<reflection>{}</reflection>",
        serde_json::json!({
            "sufficient": sufficient,
            "next_query": next_query,
            "reasoning": "test"
        })
    )
}
