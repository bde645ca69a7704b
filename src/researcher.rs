//! Per-section evidence gathering.
//!
//! Research for a section is a bounded loop: search, record the results,
//! ask the LLM whether the evidence answers the section intent, and search
//! again with a refined query while it does not. At most
//! `max_reflections + 1` searches are made per section.

use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::pipeline::parse::{parse_reflection, ReflectionReply};
use crate::pipeline::prompt::{render, REFLECTION_PROMPT};
use crate::pipeline::{PipelineCallbacks, PipelineConfig, PipelineEvent};
use crate::retry;
use crate::search::{bound_results, SearchClient};
use crate::state::{OutlineSection, SectionRecord, Topic};
use crate::text::clip;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evidence shown to the reflection call is clipped per result.
const REFLECTION_EVIDENCE_CHARS: usize = 1500;

/// Runs the search/reflect loop for one section at a time.
#[derive(Clone)]
pub struct SectionResearcher {
    search: Arc<dyn SearchClient>,
    llm: LlmRouter,
    config: PipelineConfig,
    callbacks: PipelineCallbacks,
}

impl SectionResearcher {
    pub fn new(search: Arc<dyn SearchClient>, llm: LlmRouter, config: PipelineConfig) -> Self {
        Self {
            search,
            llm,
            config,
            callbacks: PipelineCallbacks::default(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: PipelineCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Gather evidence for `section`.
    ///
    /// `prior` lists the outline sections that come before this one; their
    /// titles are shown to the reflection call so it does not chase gaps
    /// another section will fill. The returned record has no draft or final
    /// content. A search or reflection call that still fails after its retry
    /// aborts the section with [`Error::SectionResearch`].
    pub async fn research(
        &self,
        topic: &Topic,
        section: &OutlineSection,
        prior: &[&OutlineSection],
    ) -> Result<SectionRecord> {
        let title = section.title.as_str();
        let mut record = SectionRecord::new(section.clone());
        let mut query = initial_query(section);

        loop {
            let attempt = record.search_attempts() + 1;
            self.callbacks.emit(&PipelineEvent::SearchIssued {
                section: title.to_string(),
                query: query.clone(),
                attempt,
            });

            let results = retry::search(
                self.search.as_ref(),
                &self.config.search_retry(),
                &query,
                self.config.search_results_per_query,
                self.config.search_content_max_length,
            )
            .await
            .map_err(|e| Error::section_research(title, e))?;
            let returned = results.len();
            let results = bound_results(
                results,
                self.config.results_per_search(),
                self.config.search_content_max_length,
            );
            if results.len() < returned {
                debug!(section = %title, returned, kept = results.len(), "Dropped results over the cap");
            }

            let found = results.len();
            debug!(section = %title, query = %query, found, "Search returned");
            self.callbacks.emit(&PipelineEvent::SearchCompleted {
                section: title.to_string(),
                results: found,
            });
            record.push_results(&query, results);

            if record.reflection_count >= self.config.max_reflections {
                debug!(section = %title, "Reflection budget spent");
                break;
            }

            let verdict = self.reflect(topic, &record, prior).await?;
            let sufficient = verdict.sufficient && found > 0;
            if found == 0 && verdict.sufficient {
                debug!(section = %title, "Empty search overrides sufficient verdict");
            }

            if sufficient {
                self.callbacks.emit(&PipelineEvent::Reflection {
                    section: title.to_string(),
                    sufficient: true,
                    next_query: None,
                    reflection_count: record.reflection_count,
                });
                break;
            }

            record.reflection_count += 1;
            query = next_query(verdict.next_query.as_deref(), &record, topic);
            self.callbacks.emit(&PipelineEvent::Reflection {
                section: title.to_string(),
                sufficient: false,
                next_query: Some(query.clone()),
                reflection_count: record.reflection_count,
            });
        }

        info!(
            section = %title,
            searches = record.search_attempts(),
            reflections = record.reflection_count,
            results = record.unique_results().len(),
            "Section research done"
        );
        Ok(record)
    }

    /// One reflection call. A reply that cannot be parsed counts as
    /// sufficient.
    async fn reflect(
        &self,
        topic: &Topic,
        record: &SectionRecord,
        prior: &[&OutlineSection],
    ) -> Result<ReflectionReply> {
        let title = record.title();
        let covered = if prior.is_empty() {
            "None".to_string()
        } else {
            prior
                .iter()
                .map(|s| format!("- {}", s.title))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let queries = record
            .queries
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = render(
            REFLECTION_PROMPT,
            &[
                ("topic", topic.as_str()),
                ("title", title),
                ("intent", &record.section.intent),
                ("covered", &covered),
                ("queries", &queries),
                ("evidence", &format_evidence(record)),
            ],
        );

        let choice = &self.config.reflection_model;
        let reply = retry::complete(
            &self.llm,
            &self.config.llm_retry(),
            "reflect",
            &prompt,
            choice.provider,
            &choice.model,
        )
        .await
        .map_err(|e| Error::section_research(title, e))?;

        Ok(parse_reflection(&reply).unwrap_or_else(|e| {
            warn!(section = %title, error = %e, "Unparseable reflection, treating as sufficient");
            ReflectionReply {
                sufficient: true,
                next_query: None,
                reasoning: None,
            }
        }))
    }
}

fn initial_query(section: &OutlineSection) -> String {
    let title = section.title.trim();
    let intent = section.intent.trim();
    if intent.is_empty() || intent.eq_ignore_ascii_case(title) {
        title.to_string()
    } else {
        format!("{}: {}", title, intent)
    }
}

/// The refined query if it is non-empty and new, otherwise the first unused
/// broadened query.
fn next_query(proposed: Option<&str>, record: &SectionRecord, topic: &Topic) -> String {
    let used = |q: &str| record.queries.iter().any(|u| u.eq_ignore_ascii_case(q));

    if let Some(q) = proposed.map(str::trim)
        && !q.is_empty()
        && !used(q)
    {
        return q.to_string();
    }

    let title = record.title().trim();
    let broadened = [
        title.to_string(),
        format!("{} {}", title, topic),
        format!("{} {} overview", title, topic),
    ];
    broadened
        .iter()
        .find(|q| !used(q.as_str()))
        .unwrap_or(&broadened[2])
        .clone()
}

fn format_evidence(record: &SectionRecord) -> String {
    let results = record.unique_results();
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] {} ({})\n{}",
                i + 1,
                r.title,
                r.url,
                clip(&r.content, REFLECTION_EVIDENCE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
