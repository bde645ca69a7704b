//! Report and snapshot files.

use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SLUG_MAX_CHARS: usize = 30;

/// Paths of a written report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub markdown: PathBuf,
    pub html: PathBuf,
}

/// Filesystem-safe form of a topic.
///
/// Keeps letters, digits, spaces, `-` and `_`, drops trailing whitespace,
/// turns spaces into `_` and caps the result at 30 characters.
pub fn slug(topic: &str) -> String {
    let kept: String = topic
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let slug: String = kept
        .trim_end()
        .replace(' ', "_")
        .chars()
        .take(SLUG_MAX_CHARS)
        .collect();
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug
    }
}

/// `deep_search_report_{slug}_{YYYYmmdd_HHMMSS}`
pub fn report_stem(topic: &str, at: &DateTime<Local>) -> String {
    format!(
        "deep_search_report_{}_{}",
        slug(topic),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Snapshot path for a run: `state_{slug}_{run_id}.json` in `dir`.
pub fn snapshot_path(dir: &Path, topic: &str, run_id: &str) -> PathBuf {
    dir.join(format!("state_{}_{}.json", slug(topic), run_id))
}

/// Write the Markdown and HTML report into `dir`, creating it if needed.
pub fn write_report(
    dir: &Path,
    topic: &str,
    markdown: &str,
    html: &str,
    at: &DateTime<Local>,
) -> Result<ReportFiles> {
    fs::create_dir_all(dir)?;
    let stem = report_stem(topic, at);
    let files = ReportFiles {
        markdown: dir.join(format!("{}.md", stem)),
        html: dir.join(format!("{}.html", stem)),
    };
    fs::write(&files.markdown, markdown)?;
    fs::write(&files.html, html)?;
    info!(
        markdown = %files.markdown.display(),
        html = %files.html.display(),
        "Report written"
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Renewable Energy Trends"), "Renewable_Energy_Trends");
        assert_eq!(slug("AI: what's next? "), "AI_whats_next");
        assert_eq!(slug("能源 转型"), "能源_转型");
        assert_eq!(slug("a".repeat(40).as_str()).len(), 30);
        assert_eq!(slug("???"), "report");
    }

    #[test]
    fn test_report_stem() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            report_stem("Renewable Energy Trends", &at),
            "deep_search_report_Renewable_Energy_Trends_20240309_140507"
        );
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let files = write_report(&out, "Energy", "# Energy\n", "<html></html>", &at).unwrap();

        assert_eq!(fs::read_to_string(&files.markdown).unwrap(), "# Energy\n");
        assert_eq!(fs::read_to_string(&files.html).unwrap(), "<html></html>");
        assert!(files.html.ends_with("deep_search_report_Energy_20240309_140507.html"));
    }

    #[test]
    fn test_snapshot_path() {
        let path = snapshot_path(Path::new("out"), "Energy Trends", "abc123");
        assert_eq!(path, Path::new("out/state_Energy_Trends_abc123.json"));
    }
}
