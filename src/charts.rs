//! Data charts extracted from the report text.
//!
//! One LLM call reads the assembled report and returns the figures worth
//! plotting as a `<charts>` JSON block. Charts that cannot be drawn are
//! dropped; the rest are rendered with Chart.js next to the report.

use crate::error::{Error, Result};
use crate::llm::LlmRouter;
use crate::pipeline::parse::parse_charts;
use crate::pipeline::prompt::{render, CHARTS_PROMPT};
use crate::pipeline::PipelineConfig;
use crate::retry;
use crate::text::clip;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MAX_CHARTS: usize = 4;

/// Report text shown to the extraction call is capped.
const CHART_INPUT_CHARS: usize = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

/// A chart of figures stated in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChart {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub title: String,
    #[serde(default, rename = "xAxisLabel")]
    pub x_axis_label: Option<String>,
    #[serde(default, rename = "yAxisLabel")]
    pub y_axis_label: Option<String>,
    pub data: Vec<DataPoint>,
}

impl DataChart {
    /// Needs a title and at least two labelled, finite points. Pie slices
    /// must not be negative.
    pub fn is_drawable(&self) -> bool {
        !self.title.trim().is_empty()
            && self.data.len() >= 2
            && self.data.iter().all(|p| {
                !p.label.trim().is_empty()
                    && p.value.is_finite()
                    && (self.kind != ChartKind::Pie || p.value >= 0.0)
            })
    }
}

/// Pulls plottable figures out of a finished report.
#[derive(Clone)]
pub struct ChartExtractor {
    llm: LlmRouter,
    config: PipelineConfig,
}

impl ChartExtractor {
    pub fn new(llm: LlmRouter, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Extract up to [`MAX_CHARTS`] drawable charts from `markdown`.
    ///
    /// Fails with [`Error::Charts`] when the reply has no valid `<charts>`
    /// block, or with the provider error once its retry is spent.
    pub async fn extract(&self, markdown: &str) -> Result<Vec<DataChart>> {
        let max_charts = MAX_CHARTS.to_string();
        let prompt = render(
            CHARTS_PROMPT,
            &[
                ("report", clip(markdown, CHART_INPUT_CHARS)),
                ("max_charts", &max_charts),
            ],
        );

        let choice = &self.config.chart_model;
        let reply = retry::complete(
            &self.llm,
            &self.config.llm_retry(),
            "charts",
            &prompt,
            choice.provider,
            &choice.model,
        )
        .await?;

        let parsed = parse_charts(&reply).map_err(Error::Charts)?;
        let proposed = parsed.len();
        let charts: Vec<DataChart> = parsed
            .into_iter()
            .filter(DataChart::is_drawable)
            .take(MAX_CHARTS)
            .collect();
        if charts.len() < proposed {
            debug!(proposed, kept = charts.len(), "Dropped undrawable or surplus charts");
        }
        info!(charts = charts.len(), "Data charts extracted");
        Ok(charts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;
    use std::sync::Arc;
    use std::time::Duration;

    const REPLY: &str = r#"<charts>{"charts": [
        {"type": "bar", "title": "Capacity added (GW)", "xAxisLabel": "Source", "yAxisLabel": "GW",
         "data": [{"label": "Solar", "value": 447}, {"label": "Wind", "value": 117}]},
        {"type": "pie", "title": "Generation share", "data": [{"label": "Coal", "value": 35.5}, {"label": "Other", "value": -1}]},
        {"type": "line", "title": "One point", "data": [{"label": "2024", "value": 3}]}
    ]}</charts>"#;

    fn extractor(llm: Arc<MockLlm>) -> ChartExtractor {
        ChartExtractor::new(
            LlmRouter::new(llm),
            PipelineConfig::new().retry_backoff(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_keeps_only_drawable_charts() {
        let llm = Arc::new(MockLlm::new(vec![REPLY]));
        let charts = extractor(llm.clone())
            .extract("# Energy\n\nSolar added 447 GW.")
            .await
            .unwrap();

        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].kind, ChartKind::Bar);
        assert_eq!(charts[0].y_axis_label.as_deref(), Some("GW"));
        assert_eq!(charts[0].data[0].value, 447.0);
        assert!(llm.prompts()[0].contains("Solar added 447 GW."));
    }

    #[tokio::test]
    async fn test_unknown_chart_type_is_rejected() {
        let llm = Arc::new(MockLlm::new(vec![
            r#"<charts>{"charts": [{"type": "radar", "title": "T", "data": []}]}</charts>"#,
        ]));
        let err = extractor(llm).extract("# Report").await.unwrap_err();
        assert!(matches!(err, Error::Charts(_)));
    }

    #[tokio::test]
    async fn test_empty_chart_list() {
        let llm = Arc::new(MockLlm::new(vec![r#"<charts>{"charts": []}</charts>"#]));
        assert!(extractor(llm).extract("# Report").await.unwrap().is_empty());
    }
}
