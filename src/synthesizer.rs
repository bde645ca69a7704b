//! Section writing.

use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::pipeline::parse::{extract_tag, parse_text_block, Tag};
use crate::pipeline::prompt::{render, SYNTHESIS_PROMPT};
use crate::pipeline::PipelineConfig;
use crate::retry;
use crate::state::{SectionRecord, Topic};
use crate::text::excerpt;
use tracing::debug;

/// Text produced for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionText {
    /// The model's reply as received
    pub draft: String,
    /// Normalized body ready for assembly
    pub content: String,
}

/// Writes a section body from its gathered evidence with one LLM call.
#[derive(Clone)]
pub struct Synthesizer {
    llm: LlmRouter,
    config: PipelineConfig,
}

impl Synthesizer {
    pub fn new(llm: LlmRouter, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Write the body of `record`'s section.
    ///
    /// `prior` holds the finalized sections that come earlier in the outline;
    /// a short excerpt of each is shown so the section does not repeat them.
    /// Search results are deduplicated by URL before prompting. The reply is
    /// normalized so the body never carries its own title or a `#`/`##`
    /// heading. Fails with [`Error::Synthesis`] when the provider keeps
    /// failing or the body comes back empty.
    pub async fn synthesize(
        &self,
        topic: &Topic,
        record: &SectionRecord,
        prior: &[&SectionRecord],
    ) -> Result<SectionText> {
        let title = record.title();
        let prompt = render(
            SYNTHESIS_PROMPT,
            &[
                ("topic", topic.as_str()),
                ("title", title),
                ("intent", &record.section.intent),
                ("previous", &self.prior_summaries(prior)),
                ("sources", &format_sources(record)),
            ],
        );
        debug!(section = %title, prompt_chars = prompt.len(), "Synthesizing section");

        let choice = &self.config.synthesis_model;
        let draft = retry::complete(
            &self.llm,
            &self.config.llm_retry(),
            "synthesize",
            &prompt,
            choice.provider,
            &choice.model,
        )
        .await
        .map_err(|e| Error::Synthesis {
            section: title.to_string(),
            reason: e.to_string(),
        })?;

        let content = normalize_body(&draft, title);
        if content.is_empty() {
            return Err(Error::Synthesis {
                section: title.to_string(),
                reason: "model returned an empty section".to_string(),
            });
        }
        Ok(SectionText { draft, content })
    }

    fn prior_summaries(&self, prior: &[&SectionRecord]) -> String {
        let summaries: Vec<String> = prior
            .iter()
            .filter(|r| !r.is_placeholder())
            .filter_map(|r| {
                let text = excerpt(r.final_content.as_deref()?, self.config.summary_excerpt_chars);
                (!text.is_empty()).then(|| format!("- {}: {}", r.title(), text))
            })
            .collect();
        if summaries.is_empty() {
            "None yet.".to_string()
        } else {
            summaries.join("\n")
        }
    }
}

fn format_sources(record: &SectionRecord) -> String {
    let results = record.unique_results();
    if results.is_empty() {
        return "No sources were found for this section.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}\nURL: {}\n{}", i + 1, r.title, r.url, r.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Unwrap the reply and make it fit under a `##` section heading.
pub(crate) fn normalize_body(reply: &str, title: &str) -> String {
    let body = extract_tag(reply, Tag::SectionContent)
        .unwrap_or_else(|| parse_text_block(reply, Tag::Section));
    let body = unwrap_whole_fence(&body);
    let body = strip_title_heading(body, title);
    demote_headings(body).trim().to_string()
}

/// Remove a ```markdown fence wrapping the entire body.
fn unwrap_whole_fence(body: &str) -> &str {
    let trimmed = body.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed;
    }
    let inner = &trimmed[3..trimmed.len() - 3];
    // A fence in the middle means the body has its own code blocks.
    if inner.contains("```") {
        return trimmed;
    }
    match inner.split_once('\n') {
        Some((lang, rest)) if lang.trim().chars().all(|c| c.is_ascii_alphanumeric()) => rest.trim(),
        _ => trimmed,
    }
}

fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    let rest = &line[hashes..];
    ((1..=6).contains(&hashes) && (rest.is_empty() || rest.starts_with(' '))).then_some(hashes)
}

fn heading_text(line: &str) -> &str {
    line.trim_start_matches('#').trim().trim_matches('*').trim()
}

fn strip_title_heading<'a>(body: &'a str, title: &str) -> &'a str {
    let trimmed = body.trim_start();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    let first = first.trim();
    let title = title.trim();
    let is_title = (heading_level(first).is_some() && heading_text(first).eq_ignore_ascii_case(title))
        || (first.starts_with("**") && first.trim_matches('*').trim().eq_ignore_ascii_case(title));
    if is_title { rest } else { trimmed }
}

/// Shift headings down so the shallowest one is `###`.
fn demote_headings(body: &str) -> String {
    let mut in_fence = false;
    let mut min_level = None;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if !in_fence && let Some(level) = heading_level(line) {
            min_level = Some(min_level.map_or(level, |m: usize| m.min(level)));
        }
    }

    let shift = match min_level {
        Some(level) if level < 3 => 3 - level,
        _ => return body.to_string(),
    };

    in_fence = false;
    body.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            match heading_level(line) {
                Some(level) if !in_fence => {
                    let new_level = (level + shift).min(6);
                    format!("{}{}", "#".repeat(new_level), &line[level..])
                }
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{OutlineSection, SearchResult};
    use crate::testing::MockLlm;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(title: &str, order: usize) -> SectionRecord {
        SectionRecord::new(OutlineSection {
            title: title.to_string(),
            intent: format!("Explain {}", title),
            order,
        })
    }

    fn synthesizer(llm: Arc<MockLlm>) -> Synthesizer {
        let config = PipelineConfig::new().retry_backoff(Duration::from_millis(1));
        Synthesizer::new(LlmRouter::new(llm), config)
    }

    fn topic() -> Topic {
        Topic::new("Renewable Energy Trends").unwrap()
    }

    #[tokio::test]
    async fn test_synthesize_dedupes_sources_and_uses_prior() {
        let mut current = record("Wind", 1);
        current.push_results(
            "wind",
            vec![
                SearchResult::new("wind", "https://a.example", "Offshore", "Offshore wind doubled."),
                SearchResult::new("wind", "https://a.example", "Offshore again", "Duplicate."),
                SearchResult::new("wind", "https://b.example", "Onshore", "Onshore grew 8%."),
            ],
        );
        let mut solar = record("Solar", 0);
        solar.finalize("Solar grew 24% in 2024. More detail follows here.").unwrap();

        let llm = Arc::new(MockLlm::new(vec![
            "<section_content>\nWind capacity rose sharply.\n</section_content>",
        ]));
        let text = synthesizer(llm.clone())
            .synthesize(&topic(), &current, &[&solar])
            .await
            .unwrap();

        assert_eq!(text.content, "Wind capacity rose sharply.");
        assert!(text.draft.contains("<section_content>"));

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("https://b.example"));
        assert!(!prompt.contains("Duplicate."));
        assert!(prompt.contains("- Solar: Solar grew 24% in 2024."));
    }

    #[tokio::test]
    async fn test_empty_reply_is_synthesis_error() {
        let llm = Arc::new(MockLlm::new(vec!["<section_content>  </section_content>"]));
        let err = synthesizer(llm)
            .synthesize(&topic(), &record("Solar", 0), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Synthesis { section, .. } if section == "Solar"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_synthesis_error() {
        let llm = Arc::new(MockLlm::scripted(vec![
            Err(Error::LlmUnavailable("down".into())),
            Err(Error::LlmUnavailable("down".into())),
        ]));
        let err = synthesizer(llm.clone())
            .synthesize(&topic(), &record("Solar", 0), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Synthesis { reason, .. } if reason.contains("down")));
        assert_eq!(llm.calls(), 2);
    }

    #[test]
    fn test_normalize_strips_title_and_demotes() {
        let reply = "<section>\n## Solar\n\nIntro text.\n\n# Costs\nCheap.\n\n## Capacity\nLarge.\n</section>";
        assert_eq!(
            normalize_body(reply, "Solar"),
            "Intro text.\n\n### Costs\nCheap.\n\n#### Capacity\nLarge."
        );
    }

    #[test]
    fn test_normalize_keeps_code_blocks() {
        let reply = "Text.\n\n```python\n# not a heading\n```\n\n## Sub\nMore.";
        assert_eq!(
            normalize_body(reply, "Solar"),
            "Text.\n\n```python\n# not a heading\n```\n\n### Sub\nMore."
        );
    }

    #[test]
    fn test_normalize_unwraps_markdown_fence() {
        let reply = "```markdown\n**Solar**\nBody text.\n```";
        assert_eq!(normalize_body(reply, "Solar"), "Body text.");
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("## Title"), Some(2));
        assert_eq!(heading_level("#hashtag"), None);
        assert_eq!(heading_level("####### seven"), None);
    }
}
