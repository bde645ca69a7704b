//! The research pipeline driver.
//!
//! A run plans an outline, then researches and writes every section in
//! outline order, optionally summarizes the result, and assembles the
//! Markdown and HTML report. All progress lives in a [`ResearchState`] that
//! can be snapshotted after each section and handed to
//! [`Pipeline::resume`] later.

mod config;
mod events;
pub(crate) mod parse;
pub(crate) mod prompt;

pub use config::{FailurePolicy, ModelChoice, PipelineConfig};
pub use events::{EventCallback, PipelineCallbacks, PipelineEvent};

use crate::assembler::assemble;
use crate::charts::{ChartExtractor, DataChart};
use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::output::{self, ReportFiles};
use crate::planner::Planner;
use crate::render::{self, SectionMeta};
use crate::researcher::SectionResearcher;
use crate::retry;
use crate::search::{EnhancedSearch, PassageRanker, SearchClient};
use crate::state::{OutlineSection, ResearchState, SectionRecord, Topic};
use crate::synthesizer::{SectionText, Synthesizer};
use crate::text::clip;
use events::verbose_callbacks;
use parse::{parse_text_block, Tag};
use prompt::{render as render_prompt, SUMMARY_PROMPT};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Report text shown to the summary call is capped.
const SUMMARY_INPUT_CHARS: usize = 30_000;

/// How a finished run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Finished, but some sections hold placeholder content or an optional
    /// step failed
    SuccessWithWarnings,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: ResearchState,
    pub markdown: String,
    pub html: String,
    pub sections: Vec<SectionMeta>,
    /// Data charts drawn in the HTML report
    pub charts: Vec<DataChart>,
    pub warnings: Vec<String>,
    pub status: RunStatus,
}

impl RunReport {
    /// Write the Markdown and HTML report into `dir`.
    pub fn save(&self, dir: &Path) -> Result<ReportFiles> {
        output::write_report(
            dir,
            self.state.topic().as_str(),
            &self.markdown,
            &self.html,
            &chrono::Local::now(),
        )
    }
}

/// Orchestrates planning, research, writing and assembly.
pub struct Pipeline {
    search: Arc<dyn SearchClient>,
    llm: LlmRouter,
    config: PipelineConfig,
    callbacks: PipelineCallbacks,
}

impl Pipeline {
    /// Build a pipeline. With `rag_enabled`, search results pass through a
    /// [`PassageRanker`] that may add `rag_top_k` passages per query.
    pub fn new(search: Arc<dyn SearchClient>, llm: LlmRouter, config: PipelineConfig) -> Self {
        let search: Arc<dyn SearchClient> = if config.rag_enabled {
            Arc::new(EnhancedSearch::new(search, PassageRanker::default(), config.rag_top_k))
        } else {
            search
        };
        Self {
            search,
            llm,
            config,
            callbacks: PipelineCallbacks::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // =========================================================================
    // Builder methods for callbacks
    // =========================================================================

    /// Forward every event to `tracing`.
    pub fn verbose(mut self, enabled: bool) -> Self {
        if enabled {
            let captured = self.callbacks.captured_events.take();
            self.callbacks = verbose_callbacks();
            self.callbacks.captured_events = captured;
        }
        self
    }

    /// Set a callback for section start and skip events.
    pub fn on_section_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_section_start = Some(Arc::new(f));
        self
    }

    /// Set a callback for search events.
    pub fn on_search<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_search = Some(Arc::new(f));
        self
    }

    /// Set a callback for reflection events.
    pub fn on_reflection<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_reflection = Some(Arc::new(f));
        self
    }

    /// Set a callback for written sections.
    pub fn on_section_done<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_section_done = Some(Arc::new(f));
        self
    }

    /// Set a callback for section failures and errors.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    /// Set a catch-all callback for any event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_event = Some(Arc::new(f));
        self
    }

    /// Keep every emitted event for [`Pipeline::take_events`].
    pub fn capture_events(mut self, enabled: bool) -> Self {
        self.callbacks.captured_events = enabled.then(|| Arc::new(Mutex::new(Vec::new())));
        self
    }

    /// Take the captured events.
    pub fn take_events(&self) -> Vec<PipelineEvent> {
        self.callbacks.take_captured()
    }

    fn emit(&self, event: PipelineEvent) {
        self.callbacks.emit(&event);
    }

    // =========================================================================
    // Main run
    // =========================================================================

    /// Research `topic` from scratch.
    pub async fn run(&self, topic: &str) -> Result<RunReport> {
        let topic = Topic::new(topic)?;
        self.drive(ResearchState::new(topic)).await
    }

    /// Continue a run from a snapshot.
    ///
    /// Planning is skipped when the state carries an outline, and sections
    /// already finalized with real content are kept as they are. Placeholder
    /// sections are attempted again.
    pub async fn resume(&self, state: ResearchState) -> Result<RunReport> {
        self.drive(state).await
    }

    async fn drive(&self, mut state: ResearchState) -> Result<RunReport> {
        let mut warnings = Vec::new();
        let topic = state.topic().clone();
        info!(topic = %topic, run_id = state.run_id(), "Starting research run");

        if !state.has_outline() {
            self.plan(&mut state).await?;
            self.snapshot(&state, &mut warnings);
        }

        let outline: Vec<OutlineSection> = state.outline().to_vec();
        let total = outline.len();
        let mut pending = Vec::new();
        for (index, section) in outline.iter().enumerate() {
            if state.is_finalized(&section.title) {
                self.emit(PipelineEvent::SectionSkipped {
                    title: section.title.clone(),
                });
            } else {
                pending.push((index, section));
            }
        }

        let researcher = SectionResearcher::new(self.search.clone(), self.llm.clone(), self.config.clone())
            .with_callbacks(self.callbacks.clone());
        let synthesizer = Synthesizer::new(self.llm.clone(), self.config.clone());

        if self.config.parallel_research && pending.len() > 1 {
            for &(index, section) in &pending {
                self.emit(PipelineEvent::SectionStart {
                    index,
                    total,
                    title: section.title.clone(),
                });
            }
            let priors: Vec<Vec<&OutlineSection>> =
                pending.iter().map(|(_, s)| preceding(&outline, s)).collect();
            let researched = futures::future::join_all(
                pending
                    .iter()
                    .zip(&priors)
                    .map(|((_, section), prior)| researcher.research(&topic, section, prior)),
            )
            .await;

            for ((_, section), research) in pending.iter().zip(researched) {
                self.write_section(&mut state, &synthesizer, section, research, &mut warnings)
                    .await?;
            }
        } else {
            for &(index, section) in &pending {
                self.emit(PipelineEvent::SectionStart {
                    index,
                    total,
                    title: section.title.clone(),
                });
                let research = researcher.research(&topic, section, &preceding(&outline, section)).await;
                self.write_section(&mut state, &synthesizer, section, research, &mut warnings)
                    .await?;
            }
        }

        if self.config.executive_summary && (!pending.is_empty() || state.executive_summary().is_none()) {
            self.summarize(&mut state, &mut warnings).await;
        }

        let markdown = assemble(&state).inspect_err(|e| {
            self.emit(PipelineEvent::Error {
                message: e.to_string(),
            });
        })?;
        state.set_final_report(markdown.clone())?;
        self.emit(PipelineEvent::ReportAssembled {
            chars: markdown.chars().count(),
        });
        self.snapshot(&state, &mut warnings);

        let charts = if self.config.data_charts {
            self.extract_charts(&markdown, &mut warnings).await
        } else {
            Vec::new()
        };

        let sections = render::section_meta(&markdown);
        let html = render::render(&markdown, &sections, &charts);

        let status = if warnings.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::SuccessWithWarnings
        };
        info!(
            sections = total,
            warnings = warnings.len(),
            chars = markdown.len(),
            "Research run finished"
        );

        Ok(RunReport {
            state,
            markdown,
            html,
            sections,
            charts,
            warnings,
            status,
        })
    }

    async fn plan(&self, state: &mut ResearchState) -> Result<()> {
        self.emit(PipelineEvent::PlanningStart {
            topic: state.topic().to_string(),
        });
        let planner = Planner::new(self.llm.clone(), self.config.clone());
        let outline = match planner.plan(state.topic()).await {
            Ok(outline) => outline,
            Err(e) => {
                self.emit(PipelineEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        self.emit(PipelineEvent::OutlineReady {
            title: outline.title.clone(),
            sections: outline.len(),
        });
        state.set_outline(outline)
    }

    /// Synthesize and finalize one researched section, applying the failure
    /// policy to research or synthesis errors.
    async fn write_section(
        &self,
        state: &mut ResearchState,
        synthesizer: &Synthesizer,
        section: &OutlineSection,
        research: Result<SectionRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let mut record = match research {
            Ok(record) => record,
            Err(e) => return self.section_failed(state, SectionRecord::new(section.clone()), e, warnings),
        };

        let written = {
            let prior = state.prior_sections(section.order);
            self.synthesize_with_retry(synthesizer, state.topic(), &record, &prior)
                .await
        };
        let SectionText { draft, content } = match written {
            Ok(text) => text,
            Err(e) => return self.section_failed(state, record, e, warnings),
        };

        record.draft_content = Some(draft);
        record.finalize(content)?;
        let chars = record.final_content.as_deref().map_or(0, |c| c.chars().count());
        state.upsert_record(record)?;
        self.emit(PipelineEvent::SectionSynthesized {
            title: section.title.clone(),
            chars,
        });
        self.snapshot(state, warnings);
        Ok(())
    }

    /// A `Synthesis` error gets one more attempt.
    async fn synthesize_with_retry(
        &self,
        synthesizer: &Synthesizer,
        topic: &Topic,
        record: &SectionRecord,
        prior: &[&SectionRecord],
    ) -> Result<SectionText> {
        match synthesizer.synthesize(topic, record, prior).await {
            Err(Error::Synthesis { reason, .. }) => {
                warn!(section = %record.title(), reason = %reason, "Synthesis failed, retrying once");
                synthesizer.synthesize(topic, record, prior).await
            }
            other => other,
        }
    }

    fn section_failed(
        &self,
        state: &mut ResearchState,
        mut record: SectionRecord,
        error: Error,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let title = record.title().to_string();
        let placeholder = self.config.failure_policy == FailurePolicy::Placeholder;
        self.emit(PipelineEvent::SectionFailed {
            title: title.clone(),
            message: error.to_string(),
            placeholder,
        });

        if !placeholder {
            return Err(error);
        }

        warn!(section = %title, error = %error, "Section replaced with placeholder");
        record.finalize_placeholder(error.to_string())?;
        state.upsert_record(record)?;
        warnings.push(format!("Section '{}' is a placeholder: {}", title, error));
        self.snapshot(state, warnings);
        Ok(())
    }

    /// Generate and store the executive summary. Failures only warn.
    async fn summarize(&self, state: &mut ResearchState, warnings: &mut Vec<String>) {
        let body: Vec<String> = state
            .sections()
            .filter(|r| !r.is_placeholder())
            .filter_map(|r| {
                r.final_content
                    .as_deref()
                    .map(|c| format!("## {}\n\n{}", r.title(), c))
            })
            .collect();
        if body.is_empty() {
            warnings.push("Executive summary skipped: no section has content".to_string());
            return;
        }
        let report = body.join("\n\n");

        let prompt = render_prompt(
            SUMMARY_PROMPT,
            &[("report", clip(&report, SUMMARY_INPUT_CHARS))],
        );
        let choice = &self.config.summary_model;
        let reply = retry::complete(
            &self.llm,
            &self.config.llm_retry(),
            "summarize",
            &prompt,
            choice.provider,
            &choice.model,
        )
        .await;

        match reply.map(|r| parse_text_block(&r, Tag::Summary)) {
            Ok(summary) if !summary.is_empty() => state.set_executive_summary(summary),
            Ok(_) => {
                warn!("Executive summary came back empty");
                warnings.push("Executive summary skipped: empty response".to_string());
            }
            Err(e) => {
                warn!(error = %e, "Executive summary failed");
                warnings.push(format!("Executive summary skipped: {}", e));
            }
        }
    }

    /// Extract data charts from the report. Failures only warn.
    async fn extract_charts(&self, markdown: &str, warnings: &mut Vec<String>) -> Vec<DataChart> {
        let extractor = ChartExtractor::new(self.llm.clone(), self.config.clone());
        match extractor.extract(markdown).await {
            Ok(charts) => {
                self.emit(PipelineEvent::ChartsExtracted {
                    charts: charts.len(),
                });
                charts
            }
            Err(e) => {
                warn!(error = %e, "Data chart extraction failed");
                warnings.push(format!("Data charts skipped: {}", e));
                Vec::new()
            }
        }
    }

    /// Write a state snapshot when intermediate saving is on. A failed write
    /// is recorded as a warning.
    fn snapshot(&self, state: &ResearchState, warnings: &mut Vec<String>) {
        if !self.config.save_intermediate_state {
            return;
        }
        let dir = &self.config.output_dir;
        let path = output::snapshot_path(dir, state.topic().as_str(), state.run_id());
        let saved = std::fs::create_dir_all(dir)
            .map_err(Error::from)
            .and_then(|_| state.save(&path));
        match saved {
            Ok(()) => self.emit(PipelineEvent::SnapshotSaved { path }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not save state snapshot");
                warnings.push(format!("State snapshot not saved: {}", e));
            }
        }
    }
}

/// Outline entries that come before `section`.
fn preceding<'a>(outline: &'a [OutlineSection], section: &OutlineSection) -> Vec<&'a OutlineSection> {
    outline.iter().filter(|s| s.order < section.order).collect()
}
