//! Markdown report assembly.
//!
//! Assembly is a pure function of the finalized [`ResearchState`]: the same
//! state always yields byte-identical Markdown.

use crate::error::{Error, Result};
use crate::state::ResearchState;
use std::collections::HashSet;

pub const EXECUTIVE_SUMMARY_HEADING: &str = "Executive Summary";
pub const SOURCES_HEADING: &str = "Sources";

/// Merge the finalized sections of `state` into one Markdown document.
///
/// Layout: `# {report title}`, an optional executive summary, one `##`
/// section per outline entry in outline order, then a deduplicated source
/// list when any section cited search results. Fails with
/// [`Error::Assembly`] when a section is missing or not finalized; the error
/// carries the sections merged before the gap.
pub fn assemble(state: &ResearchState) -> Result<String> {
    if !state.has_outline() {
        return Err(Error::Assembly {
            reason: "state has no outline".to_string(),
            partial: Vec::new(),
        });
    }

    let mut sections: Vec<(String, String)> = Vec::with_capacity(state.outline().len());
    for entry in state.outline() {
        let content = state
            .record(&entry.title)
            .and_then(|r| r.final_content.as_deref());
        match content {
            Some(content) => sections.push((entry.title.clone(), close_code_fences(content.trim()))),
            None => {
                return Err(Error::Assembly {
                    reason: format!("section '{}' is not finalized", entry.title),
                    partial: sections,
                });
            }
        }
    }

    let mut out = format!("# {}\n", state.report_title().trim());

    if let Some(summary) = state.executive_summary().map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str(&format!(
            "\n## {}\n\n{}\n",
            EXECUTIVE_SUMMARY_HEADING,
            close_code_fences(summary)
        ));
    }

    for (title, content) in &sections {
        out.push_str(&format!("\n## {}\n\n{}\n", title, content));
    }

    let sources = sources(state);
    if !sources.is_empty() {
        out.push_str(&format!("\n## {}\n\n", SOURCES_HEADING));
        for (i, (title, url)) in sources.iter().enumerate() {
            let label = if title.trim().is_empty() { url } else { title };
            out.push_str(&format!("{}. [{}]({})\n", i + 1, label.trim(), url));
        }
    }

    Ok(out)
}

/// `(title, url)` of every search result, first occurrence of a URL wins.
/// Placeholder sections contribute nothing.
fn sources(state: &ResearchState) -> Vec<(&str, &str)> {
    let mut seen = HashSet::new();
    state
        .sections()
        .filter(|r| !r.is_placeholder())
        .flat_map(|r| r.search_results.iter())
        .filter(|r| !r.url.is_empty() && seen.insert(r.url.as_str()))
        .map(|r| (r.title.as_str(), r.url.as_str()))
        .collect()
}

/// Append a closing fence when `content` leaves a code block open.
fn close_code_fences(content: &str) -> String {
    let open = content
        .lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count()
        % 2
        == 1;
    if open {
        format!("{}\n```", content)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Outline, SearchResult, SectionRecord, Topic};
    use pretty_assertions::assert_eq;

    fn state() -> ResearchState {
        let mut state = ResearchState::with_run_id(Topic::new("Energy").unwrap(), "r");
        state
            .set_outline(
                Outline::new(
                    "Energy Report",
                    vec![
                        ("Solar".to_string(), "s".to_string()),
                        ("Wind".to_string(), "w".to_string()),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        state
    }

    fn finalize(state: &mut ResearchState, order: usize, content: &str, urls: &[&str]) {
        let section = state.outline()[order].clone();
        let mut record = SectionRecord::new(section);
        record.push_results(
            "q",
            urls.iter()
                .map(|u| SearchResult::new("q", *u, format!("Title {}", u), "c"))
                .collect(),
        );
        record.finalize(content).unwrap();
        state.upsert_record(record).unwrap();
    }

    #[test]
    fn test_assemble_layout() {
        let mut state = state();
        finalize(&mut state, 0, "Solar body.", &["https://a", "https://b"]);
        finalize(&mut state, 1, "Wind body.", &["https://b", "https://c"]);
        state.set_executive_summary("Both grew.");

        let expected = "# Energy Report\n\
            \n## Executive Summary\n\nBoth grew.\n\
            \n## Solar\n\nSolar body.\n\
            \n## Wind\n\nWind body.\n\
            \n## Sources\n\n\
            1. [Title https://a](https://a)\n\
            2. [Title https://b](https://b)\n\
            3. [Title https://c](https://c)\n";
        assert_eq!(assemble(&state).unwrap(), expected);
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let mut state = state();
        finalize(&mut state, 1, "Wind body.", &[]);
        finalize(&mut state, 0, "Solar body.", &[]);

        let first = assemble(&state).unwrap();
        let second = assemble(&state).unwrap();
        assert_eq!(first, second);
        assert!(first.find("## Solar").unwrap() < first.find("## Wind").unwrap());
        assert!(!first.contains("## Sources"));
        assert!(!first.contains("Executive Summary"));
    }

    #[test]
    fn test_missing_section_reports_partial() {
        let mut state = state();
        finalize(&mut state, 0, "Solar body.", &[]);

        match assemble(&state).unwrap_err() {
            Error::Assembly { reason, partial } => {
                assert!(reason.contains("Wind"));
                assert_eq!(partial, vec![("Solar".to_string(), "Solar body.".to_string())]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_placeholder_sections_assemble_without_sources() {
        let mut state = state();
        finalize(&mut state, 0, "Solar body.", &["https://a"]);
        let mut wind = SectionRecord::new(state.outline()[1].clone());
        wind.push_results("q", vec![SearchResult::new("q", "https://z", "Z", "c")]);
        wind.finalize_placeholder("synthesis failed").unwrap();
        state.upsert_record(wind).unwrap();

        let report = assemble(&state).unwrap();
        assert!(report.contains("## Wind\n\n> **Content unavailable.** synthesis failed"));
        assert!(!report.contains("https://z"));
    }

    #[test]
    fn test_unterminated_fence_is_closed() {
        assert_eq!(close_code_fences("a\n```rust\nlet x = 1;"), "a\n```rust\nlet x = 1;\n```");
        assert_eq!(close_code_fences("```\nx\n```"), "```\nx\n```");
    }
}
