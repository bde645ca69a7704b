//! Deepsearch - multi-step web research reports
//!
//! Deepsearch turns a topic into a structured research report. A planner
//! drafts an outline, each section is researched with a bounded
//! search-and-reflect loop, section prose is written from the gathered
//! evidence, and the result is assembled as Markdown and rendered as a
//! self-contained HTML page, optionally with charts of the figures the
//! report cites.
//!
//! # Quick Start
//!
//! ```ignore
//! use deepsearch::{Pipeline, Settings};
//!
//! #[tokio::main]
//! async fn main() -> deepsearch::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let pipeline = Pipeline::new(
//!         settings.search_client()?,
//!         settings.llm_router()?,
//!         settings.pipeline_config(),
//!     )
//!     .verbose(true);
//!
//!     let report = pipeline.run("Renewable Energy Trends").await?;
//!     report.save(&pipeline.config().output_dir)?;
//!     println!("{}", report.markdown);
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod charts;
mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod planner;
pub mod render;
pub mod researcher;
pub mod retry;
pub mod search;
mod settings;
pub mod state;
pub mod synthesizer;
mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use charts::{ChartKind, DataChart};
pub use error::{Error, Result};
pub use llm::{LlmClient, LlmRouter, Provider};
pub use pipeline::{
    FailurePolicy, ModelChoice, Pipeline, PipelineCallbacks, PipelineConfig, PipelineEvent,
    RunReport, RunStatus,
};
pub use search::SearchClient;
pub use settings::{ProviderKind, Settings};
pub use state::{Outline, OutlineSection, ResearchState, SearchResult, SectionRecord, Topic};
