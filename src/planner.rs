//! Outline planning.

use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::pipeline::parse::parse_outline;
use crate::pipeline::prompt::{render, PLANNER_PROMPT};
use crate::pipeline::PipelineConfig;
use crate::retry;
use crate::state::{Outline, Topic};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Produces the report outline with one LLM call.
pub struct Planner {
    llm: LlmRouter,
    config: PipelineConfig,
}

impl Planner {
    pub fn new(llm: LlmRouter, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Plan an outline for `topic`.
    ///
    /// Blank titles are dropped and repeated titles keep their first
    /// occurrence. Fails with [`Error::Planning`] when nothing usable is left
    /// or the provider keeps failing.
    pub async fn plan(&self, topic: &Topic) -> Result<Outline> {
        let prompt = render(
            PLANNER_PROMPT,
            &[
                ("topic", topic.as_str()),
                ("max_sections", &self.config.max_sections.to_string()),
            ],
        );

        let choice = &self.config.planner_model;
        let reply = retry::complete(
            &self.llm,
            &self.config.llm_retry(),
            "plan",
            &prompt,
            choice.provider,
            &choice.model,
        )
        .await
        .map_err(|e| Error::Planning(format!("planner call failed: {}", e)))?;

        let outline = self.outline_from_reply(topic, &reply)?;
        info!(
            title = %outline.title,
            sections = outline.len(),
            "Outline planned"
        );
        Ok(outline)
    }

    fn outline_from_reply(&self, topic: &Topic, reply: &str) -> Result<Outline> {
        let parsed = parse_outline(reply).map_err(Error::Planning)?;

        let mut seen = HashSet::new();
        let mut sections = Vec::new();
        for entry in parsed.sections {
            let title = entry.title.trim().to_string();
            if title.is_empty() {
                debug!("Dropping outline entry with blank title");
                continue;
            }
            if !seen.insert(title.to_lowercase()) {
                warn!(title = %title, "Dropping duplicate outline title");
                continue;
            }
            let intent = match entry.intent.trim() {
                "" => title.clone(),
                intent => intent.to_string(),
            };
            sections.push((title, intent));
        }

        if sections.len() > self.config.max_sections {
            warn!(
                planned = sections.len(),
                kept = self.config.max_sections,
                "Truncating outline"
            );
            sections.truncate(self.config.max_sections);
        }
        if sections.is_empty() {
            return Err(Error::Planning(
                "planner reply contains no usable sections".to_string(),
            ));
        }

        let title = match parsed.title.trim() {
            "" => topic.as_str().to_string(),
            t => t.to_string(),
        };
        Outline::new(title, sections).map_err(|e| Error::Planning(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{outline_reply, MockLlm};
    use std::sync::Arc;
    use std::time::Duration;

    fn planner(llm: Arc<MockLlm>) -> Planner {
        let config = PipelineConfig::new()
            .max_sections(3)
            .retry_backoff(Duration::from_millis(1));
        Planner::new(LlmRouter::new(llm), config)
    }

    fn topic() -> Topic {
        Topic::new("Renewable Energy Trends").unwrap()
    }

    #[tokio::test]
    async fn test_plan_outline() {
        let llm = Arc::new(MockLlm::new(vec![&outline_reply(
            "Energy Report",
            &["Solar", "Wind"],
        )]));
        let outline = planner(llm.clone()).plan(&topic()).await.unwrap();

        assert_eq!(outline.title, "Energy Report");
        assert_eq!(outline.sections[0].title, "Solar");
        assert_eq!(outline.sections[1].order, 1);
        assert!(llm.prompts()[0].contains("Renewable Energy Trends"));
    }

    #[tokio::test]
    async fn test_plan_dedupes_and_truncates() {
        let reply = outline_reply("", &["Solar", " solar ", "", "Wind", "Hydro", "Nuclear"]);
        let llm = Arc::new(MockLlm::new(vec![&reply]));
        let outline = planner(llm).plan(&topic()).await.unwrap();

        let titles: Vec<&str> = outline.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Solar", "Wind", "Hydro"]);
        assert_eq!(outline.title, "Renewable Energy Trends");
    }

    #[tokio::test]
    async fn test_plan_malformed_reply_is_planning_error() {
        let llm = Arc::new(MockLlm::new(vec!["I cannot help with that."]));
        let err = planner(llm.clone()).plan(&topic()).await.unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
        // not retried
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_plan_empty_sections_is_planning_error() {
        let llm = Arc::new(MockLlm::new(vec![&outline_reply("T", &["", "  "])]));
        let err = planner(llm).plan(&topic()).await.unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
    }

    #[tokio::test]
    async fn test_plan_retries_transient_failure_once() {
        let llm = Arc::new(MockLlm::scripted(vec![
            Err(Error::LlmRateLimited("429".into())),
            Ok(outline_reply("T", &["Only"])),
        ]));
        let outline = planner(llm.clone()).plan(&topic()).await.unwrap();
        assert_eq!(outline.len(), 1);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_plan_gives_up_after_second_failure() {
        let llm = Arc::new(MockLlm::scripted(vec![
            Err(Error::LlmUnavailable("down".into())),
            Err(Error::LlmUnavailable("down".into())),
        ]));
        let err = planner(llm).plan(&topic()).await.unwrap_err();
        assert!(matches!(err, Error::Planning(msg) if msg.contains("down")));
    }
}
