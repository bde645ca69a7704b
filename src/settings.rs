//! File and environment configuration.
//!
//! Settings come from an optional TOML file, then environment variables,
//! then command-line overrides applied by the caller. They build the
//! provider clients and the [`PipelineConfig`].
//!
//! ```toml
//! [llm]
//! primary = "deepseek"
//! secondary = "openai"
//!
//! [llm.deepseek]
//! model = "deepseek-chat"
//!
//! [search]
//! max_results = 3
//!
//! [pipeline]
//! max_reflections = 2
//! failure_policy = "placeholder"
//!
//! [stages.reflection]
//! provider = "secondary"
//! model = "gpt-4o-mini"
//! ```

use crate::error::{Error, Result};
use crate::llm::{deepseek, openai, ChatSettings, DeepSeekClient, LlmClient, LlmRouter, OpenAiClient};
use crate::pipeline::{FailurePolicy, ModelChoice, PipelineConfig};
use crate::search::{SearchClient, TavilyClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Concrete LLM service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepSeek,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(Error::Config(format!("unknown LLM provider '{}'", other))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::DeepSeek => f.write_str("deepseek"),
            ProviderKind::OpenAi => f.write_str("openai"),
        }
    }
}

/// Connection settings of one LLM service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Usually supplied through the environment
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub primary: ProviderKind,
    pub secondary: Option<ProviderKind>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub deepseek: ProviderSettings,
    pub openai: ProviderSettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            primary: ProviderKind::DeepSeek,
            secondary: None,
            temperature: 0.7,
            max_tokens: 4096,
            deepseek: ProviderSettings::default(),
            openai: ProviderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub api_key: Option<String>,
    pub max_results: usize,
    pub content_max_length: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            api_key: None,
            max_results: defaults.search_results_per_query,
            content_max_length: defaults.search_content_max_length,
            timeout_secs: defaults.search_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub max_reflections: usize,
    pub max_sections: usize,
    pub failure_policy: FailurePolicy,
    pub executive_summary: bool,
    pub data_charts: bool,
    pub parallel_research: bool,
    pub rag_enabled: bool,
    pub rag_top_k: usize,
    pub llm_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub save_intermediate_state: bool,
    pub output_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            max_reflections: defaults.max_reflections,
            max_sections: defaults.max_sections,
            failure_policy: defaults.failure_policy,
            executive_summary: defaults.executive_summary,
            data_charts: defaults.data_charts,
            parallel_research: defaults.parallel_research,
            rag_enabled: defaults.rag_enabled,
            rag_top_k: defaults.rag_top_k,
            llm_timeout_secs: defaults.llm_timeout.as_secs(),
            retry_backoff_ms: defaults.retry_backoff.as_millis() as u64,
            save_intermediate_state: defaults.save_intermediate_state,
            output_dir: defaults.output_dir,
        }
    }
}

/// Per-stage provider and model overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    pub planner: Option<ModelChoice>,
    pub reflection: Option<ModelChoice>,
    pub synthesis: Option<ModelChoice>,
    pub summary: Option<ModelChoice>,
    pub charts: Option<ModelChoice>,
}

/// Everything needed to wire up a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub pipeline: RunSettings,
    pub stages: StageSettings,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid settings file: {}", e)))
    }

    /// Load `path` (when given), then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Override keys, models and endpoints from environment variables.
    ///
    /// `lookup` returns the value of a variable; blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DEEPSEEK_API_KEY") {
            self.llm.deepseek.api_key = Some(v);
        }
        if let Some(v) = get("DEEPSEEK_MODEL") {
            self.llm.deepseek.model = Some(v);
        }
        if let Some(v) = get("DEEPSEEK_BASE_URL") {
            self.llm.deepseek.base_url = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.llm.openai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.openai.model = Some(v);
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.openai.base_url = Some(v);
        }
        if let Some(v) = get("TAVILY_API_KEY") {
            self.search.api_key = Some(v);
        }
    }

    fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::DeepSeek => &self.llm.deepseek,
            ProviderKind::OpenAi => &self.llm.openai,
        }
    }

    /// Chat settings for `kind`, failing when its API key is missing.
    pub fn chat_settings(&self, kind: ProviderKind) -> Result<ChatSettings> {
        let provider = self.provider(kind);
        let (env_key, base_url, model) = match kind {
            ProviderKind::DeepSeek => (
                "DEEPSEEK_API_KEY",
                deepseek::DEFAULT_BASE_URL,
                deepseek::DEFAULT_MODEL,
            ),
            ProviderKind::OpenAi => (
                "OPENAI_API_KEY",
                openai::DEFAULT_BASE_URL,
                openai::DEFAULT_MODEL,
            ),
        };
        let api_key = provider
            .api_key
            .clone()
            .ok_or_else(|| Error::Config(format!("{} is not set", env_key)))?;

        Ok(ChatSettings::new(
            api_key,
            provider.base_url.as_deref().unwrap_or(base_url),
            provider.model.as_deref().unwrap_or(model),
        )
        .timeout(Duration::from_secs(self.pipeline.llm_timeout_secs))
        .temperature(self.llm.temperature)
        .max_tokens(self.llm.max_tokens))
    }

    fn llm_client(&self, kind: ProviderKind) -> Result<Arc<dyn LlmClient>> {
        let settings = self.chat_settings(kind)?;
        Ok(match kind {
            ProviderKind::DeepSeek => Arc::new(DeepSeekClient::new(settings)),
            ProviderKind::OpenAi => Arc::new(OpenAiClient::new(settings)),
        })
    }

    /// Router over the configured primary and optional secondary provider.
    pub fn llm_router(&self) -> Result<LlmRouter> {
        let mut router = LlmRouter::new(self.llm_client(self.llm.primary)?);
        if let Some(kind) = self.llm.secondary {
            router = router.with_secondary(self.llm_client(kind)?);
        }
        Ok(router)
    }

    /// Tavily search. Passage ranking is applied by the pipeline when RAG is
    /// enabled.
    pub fn search_client(&self) -> Result<Arc<dyn SearchClient>> {
        let api_key = self
            .search
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("TAVILY_API_KEY is not set".to_string()))?;
        Ok(Arc::new(TavilyClient::new(
            api_key,
            Duration::from_secs(self.search.timeout_secs),
        )))
    }

    /// The run configuration described by these settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let run = &self.pipeline;
        let mut config = PipelineConfig::new()
            .max_reflections(run.max_reflections)
            .search_results_per_query(self.search.max_results)
            .search_content_max_length(self.search.content_max_length)
            .max_sections(run.max_sections)
            .failure_policy(run.failure_policy)
            .executive_summary(run.executive_summary)
            .data_charts(run.data_charts)
            .parallel_research(run.parallel_research)
            .llm_timeout(Duration::from_secs(run.llm_timeout_secs))
            .search_timeout(Duration::from_secs(self.search.timeout_secs))
            .retry_backoff(Duration::from_millis(run.retry_backoff_ms))
            .save_intermediate_state(run.save_intermediate_state)
            .output_dir(run.output_dir.clone());
        if run.rag_enabled {
            config = config.rag(run.rag_top_k);
        }

        let stages = &self.stages;
        if let Some(choice) = &stages.planner {
            config.planner_model = choice.clone();
        }
        if let Some(choice) = &stages.reflection {
            config.reflection_model = choice.clone();
        }
        if let Some(choice) = &stages.synthesis {
            config.synthesis_model = choice.clone();
        }
        if let Some(choice) = &stages.summary {
            config.summary_model = choice.clone();
        }
        if let Some(choice) = &stages.charts {
            config.chart_model = choice.clone();
        }
        config
    }
}
