//! Tavily search API.

use super::{bound_results, SearchClient};
use crate::error::{Error, Result};
use crate::state::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl TavilyResult {
    fn into_search_result(self, query: &str) -> SearchResult {
        let content = self
            .content
            .filter(|c| !c.trim().is_empty())
            .or(self.raw_content)
            .unwrap_or_default();
        let result = SearchResult::new(query, self.url, self.title, content);
        match self.score {
            Some(score) => result.with_score(score),
            None => result,
        }
    }
}

/// Tavily web search client.
#[derive(Clone)]
pub struct TavilyClient {
    agent: ureq::Agent,
    api_key: String,
    url: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            api_key: api_key.into(),
            url: SEARCH_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (proxies, test servers).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn search_blocking(&self, query: &str, max_results: usize) -> Result<Vec<TavilyResult>> {
        let request = TavilySearchRequest {
            query,
            max_results: max_results.max(1),
            search_depth: "advanced",
            include_raw_content: true,
        };

        let response = self
            .agent
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send_json(&request);

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_json::<TavilySearchResponse>()
                .map(|data| data.results)
                .map_err(|e| Error::SearchUnavailable(format!("Error parsing response: {}", e))),
            Err(ureq::Error::StatusCode(code)) => {
                Err(Error::SearchUnavailable(format!("HTTP error {}", code)))
            }
            Err(ureq::Error::Timeout(t)) => {
                Err(Error::SearchUnavailable(format!("request timed out: {:?}", t)))
            }
            Err(e) => Err(Error::SearchUnavailable(format!("Request error: {}", e))),
        }
    }
}

#[async_trait]
impl SearchClient for TavilyClient {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_content_length: usize,
    ) -> Result<Vec<SearchResult>> {
        let client = self.clone();
        let owned_query = query.to_string();
        let raw = tokio::task::spawn_blocking(move || client.search_blocking(&owned_query, max_results))
            .await
            .map_err(|e| Error::SearchUnavailable(format!("search task failed: {}", e)))??;

        let results = raw.into_iter().map(|r| r.into_search_result(query));
        Ok(bound_results(results, max_results, max_content_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_prefers_summary_content() {
        let json = r#"{
            "results": [
                {"title": "A", "url": "https://a", "content": "summary", "raw_content": "raw", "score": 0.9},
                {"title": "B", "url": "https://b", "content": "", "raw_content": "raw only"},
                {"title": "C", "url": "https://c"}
            ]
        }"#;
        let data: TavilySearchResponse = serde_json::from_str(json).unwrap();
        let results: Vec<SearchResult> = data
            .results
            .into_iter()
            .map(|r| r.into_search_result("q"))
            .collect();

        assert_eq!(results[0].content, "summary");
        assert_eq!(results[0].score, Some(0.9));
        assert_eq!(results[1].content, "raw only");
        assert_eq!(results[2].content, "");
        assert!(results.iter().all(|r| r.query == "q"));
    }

    #[test]
    fn test_request_shape() {
        let request = TavilySearchRequest {
            query: "solar",
            max_results: 3,
            search_depth: "advanced",
            include_raw_content: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "solar");
        assert_eq!(json["max_results"], 3);
    }
}
