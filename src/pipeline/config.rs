//! Pipeline configuration.

use crate::llm::Provider;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What to do when one section's research or synthesis fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run with the section's error
    Abort,
    /// Finalize the section with a "content unavailable" placeholder and go on
    #[default]
    Placeholder,
}

/// Provider and model used for one kind of LLM call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelChoice {
    #[serde(default)]
    pub provider: Provider,
    /// Model name; empty selects the provider's default model
    #[serde(default)]
    pub model: String,
}

impl ModelChoice {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Configuration for a research run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum reflection rounds per section (searches = reflections + 1)
    pub max_reflections: usize,
    /// Results requested per search query
    pub search_results_per_query: usize,
    /// Maximum characters kept from each search result
    pub search_content_max_length: usize,
    /// Maximum number of outline sections kept from the planner
    pub max_sections: usize,
    /// Behaviour on section research/synthesis failure
    pub failure_policy: FailurePolicy,
    /// Generate an executive summary with an extra LLM call
    pub executive_summary: bool,
    /// Run every section's search phase concurrently before synthesis
    pub parallel_research: bool,
    /// Enhance search results with passage retrieval
    pub rag_enabled: bool,
    /// Extra passages added per query when `rag_enabled`
    pub rag_top_k: usize,
    pub planner_model: ModelChoice,
    pub reflection_model: ModelChoice,
    pub synthesis_model: ModelChoice,
    pub summary_model: ModelChoice,
    pub chart_model: ModelChoice,
    /// Extract data charts from the finished report with an extra LLM call
    pub data_charts: bool,
    /// Per-call timeout for LLM requests
    pub llm_timeout: Duration,
    /// Per-call timeout for search requests
    pub search_timeout: Duration,
    /// Delay before retrying a transient provider failure
    pub retry_backoff: Duration,
    /// Length of the prior-section excerpts passed to synthesis
    pub summary_excerpt_chars: usize,
    /// Snapshot the state after each finalized section
    pub save_intermediate_state: bool,
    /// Where reports and snapshots are written
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_reflections: 2,
            search_results_per_query: 3,
            search_content_max_length: 20_000,
            max_sections: 8,
            failure_policy: FailurePolicy::default(),
            executive_summary: true,
            parallel_research: false,
            rag_enabled: false,
            rag_top_k: 3,
            planner_model: ModelChoice::default(),
            reflection_model: ModelChoice::default(),
            synthesis_model: ModelChoice::default(),
            summary_model: ModelChoice::default(),
            chart_model: ModelChoice::default(),
            data_charts: false,
            llm_timeout: Duration::from_secs(120),
            search_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(500),
            summary_excerpt_chars: 400,
            save_intermediate_state: false,
            output_dir: PathBuf::from("reports"),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of reflection rounds per section.
    pub fn max_reflections(mut self, n: usize) -> Self {
        self.max_reflections = n;
        self
    }

    /// Set the number of results requested per query.
    pub fn search_results_per_query(mut self, n: usize) -> Self {
        self.search_results_per_query = n.max(1);
        self
    }

    /// Set the per-result content cap.
    pub fn search_content_max_length(mut self, n: usize) -> Self {
        self.search_content_max_length = n;
        self
    }

    /// Cap the outline length.
    pub fn max_sections(mut self, n: usize) -> Self {
        self.max_sections = n.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enable or disable the executive summary call.
    pub fn executive_summary(mut self, enabled: bool) -> Self {
        self.executive_summary = enabled;
        self
    }

    /// Research all sections concurrently; synthesis stays sequential.
    pub fn parallel_research(mut self, enabled: bool) -> Self {
        self.parallel_research = enabled;
        self
    }

    /// Enable passage retrieval with `top_k` extra passages per query.
    pub fn rag(mut self, top_k: usize) -> Self {
        self.rag_enabled = true;
        self.rag_top_k = top_k;
        self
    }

    /// Add Chart.js charts of the figures found in the report.
    pub fn data_charts(mut self, enabled: bool) -> Self {
        self.data_charts = enabled;
        self
    }

    /// Use `choice` for every LLM call.
    pub fn model(mut self, choice: ModelChoice) -> Self {
        self.planner_model = choice.clone();
        self.reflection_model = choice.clone();
        self.synthesis_model = choice.clone();
        self.summary_model = choice.clone();
        self.chart_model = choice;
        self
    }

    pub fn reflection_model(mut self, choice: ModelChoice) -> Self {
        self.reflection_model = choice;
        self
    }

    pub fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Snapshot the state into `output_dir` after each finalized section.
    pub fn save_intermediate_state(mut self, enabled: bool) -> Self {
        self.save_intermediate_state = enabled;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Most results kept from one search, counting retrieval passages.
    pub fn results_per_search(&self) -> usize {
        let extra = if self.rag_enabled { self.rag_top_k } else { 0 };
        self.search_results_per_query + extra
    }

    /// Retry policy for LLM calls.
    pub fn llm_retry(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: self.retry_backoff,
            ..RetryPolicy::default()
        }
        .with_timeout(self.llm_timeout)
    }

    /// Retry policy for search calls.
    pub fn search_retry(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: self.retry_backoff,
            ..RetryPolicy::default()
        }
        .with_timeout(self.search_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_reflections, 2);
        assert_eq!(config.failure_policy, FailurePolicy::Placeholder);
        assert!(config.executive_summary);
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new()
            .max_reflections(4)
            .search_results_per_query(0)
            .rag(5)
            .model(ModelChoice::new(Provider::Secondary, "small"))
            .llm_timeout(Duration::from_secs(3));

        assert_eq!(config.max_reflections, 4);
        assert_eq!(config.search_results_per_query, 1);
        assert!(config.rag_enabled);
        assert_eq!(config.results_per_search(), 6);
        assert_eq!(config.synthesis_model.model, "small");
        assert_eq!(config.llm_retry().timeout, Duration::from_secs(3));
        assert_eq!(config.llm_retry().attempts, 2);
    }
}
