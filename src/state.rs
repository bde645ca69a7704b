//! Research state threaded through the pipeline.
//!
//! A [`ResearchState`] is created once per run and owned by the pipeline
//! driver. Each stage borrows it for the duration of its call. The state is
//! plain serde data so it can be snapshotted after every finalized section
//! and loaded again to resume a run.
//!
//! # Example
//!
//! ```ignore
//! use deepsearch::{ResearchState, Topic};
//!
//! let mut state = ResearchState::new(Topic::new("Renewable Energy Trends")?);
//! state.set_outline(outline)?;
//! state.save(&path)?;
//!
//! let restored = ResearchState::load(&path)?;
//! assert_eq!(restored.topic(), state.topic());
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// The research topic. Always non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Create a topic, rejecting blank input.
    pub fn new(topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        let trimmed = topic.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidTopic);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Topic::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

/// One entry of the report outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    /// What this section must answer
    pub intent: String,
    /// 0-based position in the outline
    pub order: usize,
}

/// The planned report: a title and its ordered sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

impl Outline {
    /// Build an outline from `(title, intent)` pairs, assigning order.
    ///
    /// Fails if there are no sections or if two titles collide.
    pub fn new(
        title: impl Into<String>,
        sections: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let sections: Vec<OutlineSection> = sections
            .into_iter()
            .enumerate()
            .map(|(order, (title, intent))| OutlineSection {
                title,
                intent,
                order,
            })
            .collect();

        let outline = Self {
            title: title.into(),
            sections,
        };
        outline.validate()?;
        Ok(outline)
    }

    /// Check the outline invariants: non-empty, unique non-blank titles.
    pub fn validate(&self) -> Result<()> {
        if self.sections.is_empty() {
            return Err(Error::State("outline has no sections".to_string()));
        }
        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.title.trim().is_empty() {
                return Err(Error::State("outline contains a blank title".to_string()));
            }
            if !seen.insert(section.title.as_str()) {
                return Err(Error::State(format!(
                    "duplicate outline title '{}'",
                    section.title
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// A single search hit, with content capped to the configured length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub url: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SearchResult {
    pub fn new(
        query: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            url: url.into(),
            title: title.into(),
            content: content.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Cap `content` to `max_chars` characters.
    pub fn truncated(mut self, max_chars: usize) -> Self {
        if let Some((idx, _)) = self.content.char_indices().nth(max_chars) {
            self.content.truncate(idx);
        }
        self
    }
}

/// Everything gathered and written for one outline section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub section: OutlineSection,
    pub search_results: Vec<SearchResult>,
    /// Queries issued, in order. One entry per search attempt.
    #[serde(default)]
    pub queries: Vec<String>,
    pub reflection_count: usize,
    pub draft_content: Option<String>,
    pub final_content: Option<String>,
    /// Set when the section was finalized with placeholder content.
    #[serde(default)]
    pub placeholder: Option<String>,
}

impl SectionRecord {
    /// Create an empty record for `section`.
    pub fn new(section: OutlineSection) -> Self {
        Self {
            section,
            search_results: Vec::new(),
            queries: Vec::new(),
            reflection_count: 0,
            draft_content: None,
            final_content: None,
            placeholder: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.section.title
    }

    /// Record one search attempt and the results it returned.
    pub fn push_results(&mut self, query: &str, results: Vec<SearchResult>) {
        self.queries.push(query.to_string());
        self.search_results.extend(results);
    }

    /// Number of search attempts made for this section.
    pub fn search_attempts(&self) -> usize {
        self.queries.len()
    }

    /// Search results deduplicated by URL, first occurrence wins.
    pub fn unique_results(&self) -> Vec<&SearchResult> {
        let mut seen = HashSet::new();
        self.search_results
            .iter()
            .filter(|r| seen.insert(r.url.as_str()))
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.final_content.is_some()
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Finalize with synthesized content. A record is finalized only once.
    pub fn finalize(&mut self, content: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.final_content = Some(content.into());
        Ok(())
    }

    /// Finalize with a "content unavailable" placeholder explaining `reason`.
    pub fn finalize_placeholder(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        let reason = reason.into();
        self.final_content = Some(placeholder_content(&reason));
        self.placeholder = Some(reason);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::State(format!(
                "section '{}' is already finalized",
                self.section.title
            )));
        }
        Ok(())
    }
}

/// Body used for sections whose research or synthesis failed.
pub fn placeholder_content(reason: &str) -> String {
    format!("> **Content unavailable.** {}", reason.trim())
}

/// Progress of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total_sections: usize,
    pub finalized_sections: usize,
    pub placeholder_sections: usize,
    pub is_completed: bool,
}

impl Progress {
    pub fn percentage(&self) -> f64 {
        if self.total_sections == 0 {
            0.0
        } else {
            self.finalized_sections as f64 / self.total_sections as f64 * 100.0
        }
    }
}

/// The mutable document threaded through a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    run_id: String,
    topic: Topic,
    report_title: Option<String>,
    outline: Vec<OutlineSection>,
    sections: IndexMap<String, SectionRecord>,
    executive_summary: Option<String>,
    final_report: Option<String>,
}

impl ResearchState {
    /// Create a fresh state with a random run id.
    pub fn new(topic: Topic) -> Self {
        Self::with_run_id(topic, uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_run_id(topic: Topic, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            topic,
            report_title: None,
            outline: Vec::new(),
            sections: IndexMap::new(),
            executive_summary: None,
            final_report: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Report title proposed by the planner, or the topic.
    pub fn report_title(&self) -> &str {
        self.report_title
            .as_deref()
            .unwrap_or_else(|| self.topic.as_str())
    }

    pub fn outline(&self) -> &[OutlineSection] {
        &self.outline
    }

    pub fn has_outline(&self) -> bool {
        !self.outline.is_empty()
    }

    /// Install the planned outline. The outline is set once per run.
    pub fn set_outline(&mut self, outline: Outline) -> Result<()> {
        if self.has_outline() {
            return Err(Error::State("outline is already set".to_string()));
        }
        outline.validate()?;
        let title = outline.title.trim();
        if !title.is_empty() {
            self.report_title = Some(title.to_string());
        }
        self.outline = outline.sections;
        Ok(())
    }

    /// Section records in outline order.
    pub fn sections(&self) -> impl Iterator<Item = &SectionRecord> {
        self.sections.values()
    }

    pub fn record(&self, title: &str) -> Option<&SectionRecord> {
        self.sections.get(title)
    }

    /// Whether `title` already holds real (non-placeholder) final content.
    pub fn is_finalized(&self, title: &str) -> bool {
        self.record(title)
            .is_some_and(|r| r.is_finalized() && !r.is_placeholder())
    }

    /// Insert or replace the record for its section.
    ///
    /// The section must belong to the outline, and a record that already
    /// holds real content is never replaced. Records stay in outline order.
    pub fn upsert_record(&mut self, record: SectionRecord) -> Result<()> {
        let title = record.title().to_string();
        if !self.outline.iter().any(|s| s == &record.section) {
            return Err(Error::State(format!(
                "section '{}' is not part of the outline",
                title
            )));
        }
        if self.is_finalized(&title) {
            return Err(Error::State(format!(
                "section '{}' is already finalized",
                title
            )));
        }
        if record.reflection_count > record.search_attempts() {
            return Err(Error::State(format!(
                "section '{}' reflected more often than it searched",
                title
            )));
        }

        self.sections.insert(title, record);
        self.sections
            .sort_by(|_, a, _, b| a.section.order.cmp(&b.section.order));
        // Any change to the sections invalidates a previously built report.
        self.final_report = None;
        Ok(())
    }

    /// Finalized sections that come before `order` in the outline.
    pub fn prior_sections(&self, order: usize) -> Vec<&SectionRecord> {
        self.sections
            .values()
            .filter(|r| r.section.order < order && r.is_finalized())
            .collect()
    }

    /// True when every outline section has final content.
    pub fn all_finalized(&self) -> bool {
        self.has_outline()
            && self
                .outline
                .iter()
                .all(|s| self.record(&s.title).is_some_and(SectionRecord::is_finalized))
    }

    pub fn executive_summary(&self) -> Option<&str> {
        self.executive_summary.as_deref()
    }

    pub fn set_executive_summary(&mut self, summary: impl Into<String>) {
        self.executive_summary = Some(summary.into());
        self.final_report = None;
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    /// Store the assembled report. Only allowed once every section is final.
    pub fn set_final_report(&mut self, report: impl Into<String>) -> Result<()> {
        if !self.all_finalized() {
            return Err(Error::State(
                "final report requires every section to be finalized".to_string(),
            ));
        }
        self.final_report = Some(report.into());
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let finalized = self.sections().filter(|r| r.is_finalized()).count();
        let placeholders = self.sections().filter(|r| r.is_placeholder()).count();
        Progress {
            total_sections: self.outline.len(),
            finalized_sections: finalized,
            placeholder_sections: placeholders,
            is_completed: self.final_report.is_some(),
        }
    }

    /// Write the state as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a state written by [`ResearchState::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&json)?;
        if state.has_outline() {
            let outline = Outline {
                title: state.report_title().to_string(),
                sections: state.outline.clone(),
            };
            outline.validate()?;
        }
        Ok(state)
    }
}
