//! Prompt templates for each LLM call.
//!
//! Every template ends with the tagged block the model must fill in; the
//! matching parsers live in [`super::parse`].

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Fill `{key}` placeholders in `template` in a single pass.
///
/// Substituted values are never scanned again, so a value containing
/// `{key}` stays literal. Unknown placeholders are left as they are.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

pub const PLANNER_PROMPT: &str = r#"You are an expert research planner. Plan a structured research report on the topic below.

<topic>
{topic}
</topic>

Design an outline of at most {max_sections} sections. Each section needs a short, unique title and an intent: the question the section must answer.

Respond with exactly one <outline> block containing valid JSON:

<outline>
{"title": "Report title", "sections": [{"title": "Section title", "intent": "What this section must answer"}]}
</outline>

RULES:
- Section titles must be unique
- Order sections so that each builds on the previous ones
- Do not write any section content"#;

pub const REFLECTION_PROMPT: &str = r#"You are reviewing the evidence gathered for one section of a research report.

<topic>
{topic}
</topic>

<section>
Title: {title}
Intent: {intent}
</section>

<covered_elsewhere>
{covered}
</covered_elsewhere>

<queries>
{queries}
</queries>

<evidence>
{evidence}
</evidence>

Decide whether the evidence is sufficient to answer the section intent. Ignore gaps that belong to the sections listed as covered elsewhere. If it is not, propose ONE refined web search query that fills the biggest gap and differs from the queries above.

Respond with exactly one <reflection> block containing valid JSON:

<reflection>
{"sufficient": false, "next_query": "refined search query", "reasoning": "what is missing"}
</reflection>

Use "next_query": null when the evidence is sufficient."#;

pub const SYNTHESIS_PROMPT: &str = r#"You are an expert research analyst writing one section of a report on the topic below.

<topic>
{topic}
</topic>

<section>
Title: {title}
Intent: {intent}
</section>

<previous_sections>
{previous}
</previous_sections>

<sources>
{sources}
</sources>

Write the body of this section in Markdown using only the sources above.

RULES:
- Do NOT include the section title; it is added automatically
- Use ### headings for any subsections
- Include specific numbers, names and dates from the sources
- Do not repeat what previous sections already covered
- Cite sources inline as [title](url)

Respond with the section body inside one <section_content> block:

<section_content>
...
</section_content>"#;

pub const SUMMARY_PROMPT: &str = r#"You are a research summarizer. Write an executive summary of the report below in 3-6 sentences or bullet points, focusing on the most important findings and numbers.

<report>
{report}
</report>

Respond with the summary inside one <summary> block:

<summary>
...
</summary>"#;

pub const CHARTS_PROMPT: &str = r#"You are a data analyst. Find the quantitative data in the report below that is worth visualizing.

<report>
{report}
</report>

Extract at most {max_charts} charts. Use only numbers stated in the report.

Respond with exactly one <charts> block containing valid JSON:

<charts>
{"charts": [{"type": "bar", "title": "Chart title", "xAxisLabel": "x label", "yAxisLabel": "y label", "data": [{"label": "Label 1", "value": 12.5}, {"label": "Label 2", "value": 8}]}]}
</charts>

RULES:
- "type" is one of "bar", "line" or "pie"
- Values are plain numbers without units or percent signs
- Pie chart values are percentages of one whole
- Each chart needs at least two data points
- Use {"charts": []} when the report has no suitable data"#;
