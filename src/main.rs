//! deepsearch command-line entry point.

use anyhow::{Context, Result};
use clap::Parser;
use deepsearch::{FailurePolicy, Pipeline, ProviderKind, ResearchState, RunStatus, Settings};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Generate a structured research report on a topic.
#[derive(Parser, Debug)]
#[command(name = "deepsearch", version, about, long_about = None)]
struct Cli {
    /// Research topic
    #[arg(required_unless_present = "resume")]
    topic: Option<String>,

    /// Settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for reports and state snapshots
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Continue from a saved state snapshot
    #[arg(long, value_name = "SNAPSHOT")]
    resume: Option<PathBuf>,

    /// Maximum reflection rounds per section
    #[arg(long, value_name = "N")]
    max_reflections: Option<usize>,

    /// Primary LLM provider
    #[arg(long, value_parser = ["deepseek", "openai"])]
    provider: Option<String>,

    /// Re-rank search results by passage relevance
    #[arg(long)]
    rag: bool,

    /// Extra passages kept per search when --rag is on
    #[arg(long, value_name = "K")]
    rag_top_k: Option<usize>,

    /// Stop the run when a section fails instead of writing a placeholder
    #[arg(long)]
    abort_on_section_error: bool,

    /// Skip the executive summary
    #[arg(long)]
    no_summary: bool,

    /// Chart the figures found in the report
    #[arg(long)]
    charts: bool,

    /// Save a state snapshot after every section
    #[arg(long)]
    save_state: bool,

    /// Research all sections concurrently
    #[arg(long)]
    parallel: bool,

    /// Log every pipeline event
    #[arg(short, long)]
    verbose: bool,
}

/// Apply command-line overrides on top of file and environment settings.
fn apply_overrides(cli: &Cli, settings: &mut Settings) -> deepsearch::Result<()> {
    let run = &mut settings.pipeline;
    if let Some(dir) = &cli.output_dir {
        run.output_dir = dir.clone();
    }
    if let Some(n) = cli.max_reflections {
        run.max_reflections = n;
    }
    if cli.rag {
        run.rag_enabled = true;
    }
    if let Some(k) = cli.rag_top_k {
        run.rag_top_k = k;
    }
    if cli.abort_on_section_error {
        run.failure_policy = FailurePolicy::Abort;
    }
    if cli.no_summary {
        run.executive_summary = false;
    }
    if cli.charts {
        run.data_charts = true;
    }
    if cli.save_state {
        run.save_intermediate_state = true;
    }
    if cli.parallel {
        run.parallel_research = true;
    }
    if let Some(provider) = &cli.provider {
        settings.llm.primary = provider.parse::<ProviderKind>()?;
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "deepsearch=debug" } else { "deepsearch=info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    apply_overrides(&cli, &mut settings)?;

    let config = settings.pipeline_config();
    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(
        settings.search_client().context("configuring search")?,
        settings.llm_router().context("configuring LLM providers")?,
        config,
    )
    .verbose(cli.verbose);

    let report = match &cli.resume {
        Some(path) => {
            let state = ResearchState::load(path)
                .with_context(|| format!("loading snapshot {}", path.display()))?;
            if let Some(topic) = &cli.topic
                && topic.trim() != state.topic().as_str()
            {
                warn!(
                    snapshot = %state.topic(),
                    given = %topic,
                    "Ignoring topic argument; resuming the snapshot's topic"
                );
            }
            pipeline.resume(state).await?
        }
        None => {
            let topic = cli.topic.as_deref().unwrap_or_default();
            pipeline.run(topic).await?
        }
    };

    let files = report
        .save(&output_dir)
        .with_context(|| format!("writing report to {}", output_dir.display()))?;

    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    info!(
        markdown = %files.markdown.display(),
        html = %files.html.display(),
        "Done"
    );
    println!("{}", files.markdown.display());
    println!("{}", files.html.display());
    if report.status == RunStatus::SuccessWithWarnings {
        eprintln!(
            "finished with {} warning(s); see the report for placeholder sections",
            report.warnings.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_topic_required_without_resume() {
        assert!(Cli::try_parse_from(["deepsearch"]).is_err());
        assert!(Cli::try_parse_from(["deepsearch", "--resume", "state.json"]).is_ok());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "deepsearch",
            "Renewable Energy Trends",
            "--provider",
            "openai",
            "--max-reflections",
            "4",
            "--rag",
            "--rag-top-k",
            "2",
            "--abort-on-section-error",
            "--no-summary",
            "--charts",
            "--output-dir",
            "out",
        ])
        .unwrap();
        let mut settings = Settings::default();
        apply_overrides(&cli, &mut settings).unwrap();

        assert_eq!(settings.llm.primary, ProviderKind::OpenAi);
        let config = settings.pipeline_config();
        assert_eq!(config.max_reflections, 4);
        assert!(config.rag_enabled);
        assert_eq!(config.rag_top_k, 2);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert!(!config.executive_summary);
        assert!(config.data_charts);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Cli::try_parse_from(["deepsearch", "x", "--provider", "claude"]).is_err());
    }
}
