//! Error types for the research pipeline.

use thiserror::Error;

/// Errors that can occur during a research run.
#[derive(Error, Debug)]
pub enum Error {
    /// The topic was empty after trimming
    #[error("Topic must not be empty")]
    InvalidTopic,

    /// The planner response could not be turned into an outline
    #[error("Planning failed: {0}")]
    Planning(String),

    /// Research for one section failed after retrying
    #[error("Research failed for section '{section}': {source}")]
    SectionResearch {
        section: String,
        #[source]
        source: Box<Error>,
    },

    /// Section synthesis produced nothing usable
    #[error("Synthesis failed for section '{section}': {reason}")]
    Synthesis { section: String, reason: String },

    /// Search provider error (network, auth, timeout)
    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    /// LLM provider error (network, auth, timeout)
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// LLM provider quota exhausted
    #[error("LLM rate limited: {0}")]
    LlmRateLimited(String),

    /// The report could not be assembled. Carries the sections merged so far.
    #[error("Assembly failed: {reason}")]
    Assembly {
        reason: String,
        partial: Vec<(String, String)>,
    },

    /// The chart extraction reply was unusable
    #[error("Chart extraction failed: {0}")]
    Charts(String),

    /// A research state invariant would be violated
    #[error("Invalid research state: {0}")]
    State(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error while writing reports or snapshots
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Provider failures that are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::SearchUnavailable(_) | Error::LlmUnavailable(_) | Error::LlmRateLimited(_)
        )
    }

    /// Wrap an error as the research failure of `section`.
    pub fn section_research(section: impl Into<String>, source: Error) -> Self {
        Error::SectionResearch {
            section: section.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for research operations.
pub type Result<T> = std::result::Result<T, Error>;
