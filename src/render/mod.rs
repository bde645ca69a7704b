//! Markdown report to self-contained HTML.
//!
//! The report is split on its `## ` headings; each section becomes a
//! collapsible block with a short list of key points above the rendered
//! body. A Chart.js bar chart shows the length of every research section,
//! and any extracted [`DataChart`]s are drawn below it.

mod template;

use crate::assembler::{EXECUTIVE_SUMMARY_HEADING, SOURCES_HEADING};
use crate::charts::{ChartKind, DataChart};
use crate::pipeline::prompt::render as fill;
use crate::text::{prose, sentences};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::LazyLock;
use template::{CHART_JS_CDN, PAGE_TEMPLATE, STYLE};

pub const MAX_KEY_POINTS: usize = 5;

/// Sentences with any of these words are considered key points.
const EMPHASIS_KEYWORDS: &[&str] = &[
    "important", "key", "main", "core", "significant", "increase", "decrease", "growth",
    "decline", "重要", "关键", "主要", "核心", "显著", "提升", "降低", "增加", "减少",
];

const PRIMARY_COLOR: &str = "rgba(9, 105, 218, 0.6)";

const PIE_COLORS: &[&str] = &[
    "rgba(9, 105, 218, 0.7)",
    "rgba(26, 127, 55, 0.7)",
    "rgba(191, 135, 0, 0.7)",
    "rgba(207, 34, 46, 0.7)",
    "rgba(130, 80, 223, 0.7)",
    "rgba(87, 96, 106, 0.7)",
];

static LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());

/// Title and size of one `##` section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionMeta {
    pub title: String,
    /// Length of the section body in characters
    pub content_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MarkdownSection {
    title: String,
    body: String,
}

struct SplitReport {
    title: Option<String>,
    preamble: String,
    sections: Vec<MarkdownSection>,
}

#[derive(Serialize)]
struct ChartData<'a> {
    labels: Vec<&'a str>,
    datasets: [ChartDataset; 1],
}

#[derive(Serialize)]
struct ChartDataset {
    label: &'static str,
    data: Vec<usize>,
    #[serde(rename = "backgroundColor")]
    background_color: &'static str,
}

/// Split `markdown` on top-level `#` and `##` headings outside code fences.
fn split_report(markdown: &str) -> SplitReport {
    let mut title = None;
    let mut preamble = Vec::new();
    let mut sections: Vec<MarkdownSection> = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(t) = line.strip_prefix("## ") {
                sections.push(MarkdownSection {
                    title: t.trim().to_string(),
                    body: String::new(),
                });
                continue;
            }
            if title.is_none() && sections.is_empty() && let Some(t) = line.strip_prefix("# ") {
                title = Some(t.trim().to_string());
                continue;
            }
        }
        match sections.last_mut() {
            Some(section) => {
                section.body.push_str(line);
                section.body.push('\n');
            }
            None => preamble.push(line),
        }
    }

    for section in &mut sections {
        section.body = section.body.trim().to_string();
    }
    SplitReport {
        title,
        preamble: preamble.join("\n").trim().to_string(),
        sections,
    }
}

/// Titles and body lengths of the research sections of an assembled report.
///
/// The executive summary and the source list are not research sections and
/// are left out.
pub fn section_meta(markdown: &str) -> Vec<SectionMeta> {
    split_report(markdown)
        .sections
        .into_iter()
        .filter(|s| s.title != EXECUTIVE_SUMMARY_HEADING && s.title != SOURCES_HEADING)
        .map(|s| SectionMeta {
            content_length: s.body.chars().count(),
            title: s.title,
        })
        .collect()
}

fn plain_text(sentence: &str) -> String {
    let unlinked = LINK_REGEX.replace_all(sentence, "$1");
    unlinked
        .replace("**", "")
        .replace('`', "")
        .trim_start_matches(['-', '*', '>', ' '])
        .trim()
        .to_string()
}

fn is_key_point_length(sentence: &str) -> bool {
    let len = sentence.chars().count();
    len > 10 && len < 200
}

/// Up to [`MAX_KEY_POINTS`] sentences from `body`.
///
/// Sentences mentioning a number or an emphasis keyword come first. When
/// fewer than three are found, the opening sentences fill in.
pub fn key_points(body: &str) -> Vec<String> {
    let all: Vec<String> = sentences(&prose(body))
        .iter()
        .map(|s| plain_text(s))
        .filter(|s| !s.is_empty())
        .collect();

    let mut points: Vec<String> = all
        .iter()
        .filter(|s| is_key_point_length(s))
        .filter(|s| {
            let lower = s.to_lowercase();
            s.chars().any(|c| c.is_ascii_digit()) || EMPHASIS_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .cloned()
        .collect();

    if points.len() < 3 {
        for sentence in all.iter().take(3) {
            if is_key_point_length(sentence) && !points.contains(sentence) {
                points.push(sentence.clone());
            }
        }
    }

    points.truncate(MAX_KEY_POINTS);
    points
}

fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

fn render_section(section: &MarkdownSection) -> String {
    let mut out = format!(
        "<details class=\"report-section\" open>\n<summary>{}</summary>\n",
        html_escape::encode_text(&section.title)
    );

    if section.title != SOURCES_HEADING {
        let points = key_points(&section.body);
        if !points.is_empty() {
            out.push_str("<div class=\"key-points\">\n<h3>Key points</h3>\n<ul>\n");
            for point in points {
                out.push_str(&format!("<li>{}</li>\n", html_escape::encode_text(&point)));
            }
            out.push_str("</ul>\n</div>\n");
        }
    }

    out.push_str("<div class=\"section-body\">\n");
    out.push_str(&markdown_to_html(&section.body));
    out.push_str("</div>\n</details>\n");
    out
}

/// JSON for an inline script; "</" is escaped so titles cannot close the
/// script element.
fn script_json<T: Serialize>(value: &T, fallback: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| fallback.to_string())
        .replace("</", "<\\/")
}

fn chart_json(sections: &[SectionMeta]) -> String {
    let data = ChartData {
        labels: sections.iter().map(|s| s.title.as_str()).collect(),
        datasets: [ChartDataset {
            label: "Characters",
            data: sections.iter().map(|s| s.content_length).collect(),
            background_color: PRIMARY_COLOR,
        }],
    };
    script_json(&data, "{}")
}

fn axis_title(label: Option<&str>) -> Value {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(text) => json!({"display": true, "text": text}),
        None => json!({"display": false}),
    }
}

/// Chart.js configuration for one data chart.
fn data_chart_config(chart: &DataChart) -> Value {
    let labels: Vec<&str> = chart.data.iter().map(|p| p.label.as_str()).collect();
    let values: Vec<f64> = chart.data.iter().map(|p| p.value).collect();
    let pie = chart.kind == ChartKind::Pie;

    let background: Value = if pie {
        json!(
            (0..values.len())
                .map(|i| PIE_COLORS[i % PIE_COLORS.len()])
                .collect::<Vec<_>>()
        )
    } else {
        json!(PRIMARY_COLOR)
    };

    let mut options = json!({
        "responsive": true,
        "plugins": {
            "title": {"display": true, "text": chart.title},
            "legend": {"display": pie}
        }
    });
    if !pie {
        options["scales"] = json!({
            "x": {"title": axis_title(chart.x_axis_label.as_deref())},
            "y": {"beginAtZero": true, "title": axis_title(chart.y_axis_label.as_deref())}
        });
    }

    json!({
        "type": chart.kind.as_str(),
        "data": {
            "labels": labels,
            "datasets": [{
                "label": chart.title,
                "data": values,
                "backgroundColor": background,
                "borderColor": PRIMARY_COLOR,
                "fill": false
            }]
        },
        "options": options
    })
}

fn data_charts_html(charts: &[DataChart]) -> String {
    if charts.is_empty() {
        return String::new();
    }
    let mut out = String::from("<section class=\"data-charts\">\n<h2>Data charts</h2>\n");
    for i in 0..charts.len() {
        out.push_str(&format!(
            "<div class=\"data-chart\"><canvas id=\"dataChart{}\"></canvas></div>\n",
            i
        ));
    }
    out.push_str("</section>");
    out
}

/// Render `markdown` as a complete HTML5 document.
///
/// `sections` feeds the section-length chart; pass [`section_meta`] of the
/// same report. Each entry of `charts` is drawn as its own Chart.js chart.
pub fn render(markdown: &str, sections: &[SectionMeta], charts: &[DataChart]) -> String {
    let report = split_report(markdown);
    let title = report.title.unwrap_or_else(|| "Research Report".to_string());

    let preamble = if report.preamble.is_empty() {
        String::new()
    } else {
        format!("<div class=\"preamble\">\n{}</div>", markdown_to_html(&report.preamble))
    };

    let mut body = String::from("<button id=\"toggle-all\" type=\"button\">Expand / collapse all</button>\n");
    for section in &report.sections {
        body.push_str(&render_section(section));
    }

    let configs: Vec<Value> = charts.iter().map(data_chart_config).collect();
    fill(
        PAGE_TEMPLATE,
        &[
            ("title", &html_escape::encode_text(&title)),
            ("chart_js", CHART_JS_CDN),
            ("style", STYLE),
            ("chart_data", &chart_json(sections)),
            ("data_charts", &data_charts_html(charts)),
            ("data_chart_configs", &script_json(&configs, "[]")),
            ("preamble", &preamble),
            ("sections", &body),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::DataPoint;
    use pretty_assertions::assert_eq;

    const REPORT: &str = "# Energy <Report>\n\n## Solar\n\nSolar capacity grew 24% in 2024. It is cheap. Panels are everywhere now.\n\n### Costs\n\nModule prices fell sharply last year.\n\n```text\n## not a section\n```\n\n## Wind\n\nWind is a significant source of power today.\n\n## Sources\n\n1. [A](https://a.example)\n";

    #[test]
    fn test_section_meta() {
        let meta = section_meta(REPORT);
        let titles: Vec<&str> = meta.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Solar", "Wind"]);
        assert_eq!(
            meta[1].content_length,
            "Wind is a significant source of power today.".chars().count()
        );
    }

    #[test]
    fn test_key_points_prefer_numbers_and_keywords() {
        let body = "Solar capacity grew 24% in 2024. Cheap. Panels are everywhere now. \
                    Prices are a key factor for buyers. Storage matters too for the grid.";
        assert_eq!(
            key_points(body),
            vec![
                "Solar capacity grew 24% in 2024.",
                "Prices are a key factor for buyers.",
                "Panels are everywhere now.",
            ]
        );
    }

    #[test]
    fn test_key_points_cap_and_strip_markup() {
        let body = (1..=8)
            .map(|i| format!("Item **{}** is described at [the source](https://x.example).", i))
            .collect::<Vec<_>>()
            .join(" ");
        let points = key_points(&body);
        assert_eq!(points.len(), MAX_KEY_POINTS);
        assert_eq!(points[0], "Item 1 is described at the source.");
    }

    #[test]
    fn test_render_document() {
        let html = render(REPORT, &section_meta(REPORT), &[]);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Energy &lt;Report&gt;</title>"));
        assert!(html.contains(CHART_JS_CDN));
        assert!(html.contains("\"labels\":[\"Solar\",\"Wind\"]"));
        assert!(html.contains("const dataCharts = [];"));
        assert!(!html.contains("class=\"data-charts\""));
        assert!(html.contains("<details class=\"report-section\" open>\n<summary>Solar</summary>"));
        assert!(html.contains("<li>Solar capacity grew 24% in 2024.</li>"));
        assert!(html.contains("<h3>Costs</h3>"));
        assert!(html.contains("<a href=\"https://a.example\">A</a>"));
        assert_eq!(html.matches("class=\"key-points\"").count(), 2);
    }

    #[test]
    fn test_section_meta_skips_summary_and_sources() {
        let report = "# R\n\n## Executive Summary\n\nShort.\n\n## Solar\n\nBody.\n\n## Sources\n\n1. [A](https://a.example)\n";
        let meta = section_meta(report);
        assert_eq!(
            meta,
            vec![SectionMeta {
                title: "Solar".to_string(),
                content_length: 5,
            }]
        );
    }

    #[test]
    fn test_render_data_charts() {
        let charts = vec![
            DataChart {
                kind: ChartKind::Bar,
                title: "Capacity (GW)".to_string(),
                x_axis_label: Some("Source".to_string()),
                y_axis_label: None,
                data: vec![
                    DataPoint { label: "Solar".to_string(), value: 447.0 },
                    DataPoint { label: "Wind".to_string(), value: 117.0 },
                ],
            },
            DataChart {
                kind: ChartKind::Pie,
                title: "Share </script>".to_string(),
                x_axis_label: None,
                y_axis_label: None,
                data: vec![
                    DataPoint { label: "Coal".to_string(), value: 35.5 },
                    DataPoint { label: "Other".to_string(), value: 64.5 },
                ],
            },
        ];

        let html = render(REPORT, &section_meta(REPORT), &charts);

        assert!(html.contains("<canvas id=\"dataChart0\"></canvas>"));
        assert!(html.contains("<canvas id=\"dataChart1\"></canvas>"));
        assert_eq!(html.matches("</script>").count(), 2);

        let bar = data_chart_config(&charts[0]);
        assert_eq!(bar["type"], "bar");
        assert_eq!(bar["data"]["labels"], json!(["Solar", "Wind"]));
        assert_eq!(bar["options"]["scales"]["x"]["title"]["text"], "Source");
        assert_eq!(bar["options"]["scales"]["y"]["title"]["display"], false);

        let pie = data_chart_config(&charts[1]);
        assert_eq!(pie["type"], "pie");
        assert!(pie["options"].get("scales").is_none());
        assert_eq!(pie["data"]["datasets"][0]["backgroundColor"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_report_text_is_not_treated_as_template() {
        let report = "# Braces\n\n## Notes\n\nLiteral {chart_data} and {title} in prose.\n";
        let html = render(report, &section_meta(report), &[]);
        assert!(html.contains("Literal {chart_data} and {title} in prose."));
    }

    #[test]
    fn test_chart_json_escapes_script_close() {
        let meta = vec![SectionMeta {
            title: "</script>".to_string(),
            content_length: 1,
        }];
        assert!(!chart_json(&meta).contains("</script>"));
    }
}
