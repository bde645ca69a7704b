//! Parsing of tagged LLM responses.
//!
//! Structured replies arrive as `<tag>JSON</tag>` blocks. When the tag is
//! missing, a bare JSON object (optionally inside a code fence) is accepted.
//! JSON payloads are checked against a schema before deserialization.

use crate::charts::DataChart;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

static FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|markdown|md)?\s*\n([\s\S]*?)```").unwrap());

/// Tagged blocks the prompts ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Outline,
    Reflection,
    SectionContent,
    Section,
    Summary,
    Charts,
}

impl Tag {
    const ALL: [Tag; 6] = [
        Tag::Outline,
        Tag::Reflection,
        Tag::SectionContent,
        Tag::Section,
        Tag::Summary,
        Tag::Charts,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Tag::Outline => "outline",
            Tag::Reflection => "reflection",
            Tag::SectionContent => "section_content",
            Tag::Section => "section",
            Tag::Summary => "summary",
            Tag::Charts => "charts",
        }
    }

    fn regex(self) -> &'static Regex {
        &TAG_REGEXES[self as usize]
    }
}

/// One compiled regex per [`Tag`], indexed by discriminant.
static TAG_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    Tag::ALL
        .iter()
        .map(|tag| Regex::new(&format!(r"<{0}>\s*([\s\S]*?)\s*</{0}>", tag.name())).unwrap())
        .collect()
});

static OUTLINE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "required": ["sections"],
        "properties": {
            "title": {"type": "string"},
            "sections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["title"],
                    "properties": {
                        "title": {"type": "string"},
                        "intent": {"type": "string"},
                        "description": {"type": "string"}
                    }
                }
            }
        }
    })
});

static REFLECTION_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "required": ["sufficient"],
        "properties": {
            "sufficient": {"type": "boolean"},
            "next_query": {"type": ["string", "null"]},
            "reasoning": {"type": ["string", "null"]}
        }
    })
});

static CHARTS_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "required": ["charts"],
        "properties": {
            "charts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["type", "title", "data"],
                    "properties": {
                        "type": {"enum": ["bar", "line", "pie"]},
                        "title": {"type": "string"},
                        "xAxisLabel": {"type": ["string", "null"]},
                        "yAxisLabel": {"type": ["string", "null"]},
                        "data": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["label", "value"],
                                "properties": {
                                    "label": {"type": "string"},
                                    "value": {"type": "number"}
                                }
                            }
                        }
                    }
                }
            }
        }
    })
});

#[derive(Debug, Deserialize)]
struct ChartsReply {
    charts: Vec<DataChart>,
}

/// Planner payload.
#[derive(Debug, Clone, Deserialize)]
pub struct OutlineReply {
    #[serde(default)]
    pub title: String,
    pub sections: Vec<OutlineEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    /// Older prompts call this "description"
    #[serde(default, alias = "description")]
    pub intent: String,
}

/// Reflection payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReflectionReply {
    pub sufficient: bool,
    #[serde(default)]
    pub next_query: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Extract the content of the first `<tag>...</tag>` block.
pub fn extract_tag(text: &str, tag: Tag) -> Option<String> {
    tag.regex()
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Extract the content of the first fenced code block.
pub fn extract_fence(text: &str) -> Option<String> {
    FENCE_REGEX
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Outermost `{...}` span of `text`.
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Find and validate a JSON payload for `tag`, then deserialize it.
fn parse_tagged_json<T: DeserializeOwned>(
    text: &str,
    tag: Tag,
    schema: &Value,
) -> Result<T, String> {
    let name = tag.name();
    let block = extract_tag(text, tag)
        .or_else(|| extract_fence(text))
        .unwrap_or_else(|| text.trim().to_string());
    let candidate = extract_fence(&block).unwrap_or(block);
    let json = json_object_span(&candidate).ok_or_else(|| format!("no JSON object in <{name}> reply"))?;

    let value: Value =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON in <{name}> block: {e}"))?;

    let validator =
        jsonschema::validator_for(schema).map_err(|e| format!("invalid schema for <{name}>: {e}"))?;
    let errors: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(format!("<{name}> block does not match schema: {}", errors.join("; ")));
    }

    serde_json::from_value(value).map_err(|e| format!("unexpected <{name}> payload: {e}"))
}

/// Parse the planner reply.
pub fn parse_outline(text: &str) -> Result<OutlineReply, String> {
    parse_tagged_json(text, Tag::Outline, &OUTLINE_SCHEMA)
}

/// Parse the reflection reply.
pub fn parse_reflection(text: &str) -> Result<ReflectionReply, String> {
    parse_tagged_json(text, Tag::Reflection, &REFLECTION_SCHEMA)
}

/// Parse the chart extraction reply.
pub fn parse_charts(text: &str) -> Result<Vec<DataChart>, String> {
    parse_tagged_json::<ChartsReply>(text, Tag::Charts, &CHARTS_SCHEMA).map(|r| r.charts)
}

/// Extract free text from a `<tag>` block, falling back to the whole reply.
pub fn parse_text_block(text: &str, tag: Tag) -> String {
    extract_tag(text, tag).unwrap_or_else(|| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag() {
        let text = "Sure!\n<outline>\n{\"a\": 1}\n</outline>\nDone.";
        assert_eq!(extract_tag(text, Tag::Outline), Some("{\"a\": 1}".to_string()));
        assert_eq!(extract_tag("nothing", Tag::Outline), None);
        // closing tags must match the opening tag
        let nested = "<section><section_content>Body</section_content></section>";
        assert_eq!(extract_tag(nested, Tag::SectionContent), Some("Body".to_string()));
        assert_eq!(
            extract_tag(nested, Tag::Section),
            Some("<section_content>Body</section_content>".to_string())
        );
    }

    #[test]
    fn test_parse_outline_tagged() {
        let text = r#"<outline>{"title": "Energy", "sections": [
            {"title": "Solar", "intent": "How fast is solar growing?"},
            {"title": "Wind", "description": "Offshore wind"}
        ]}</outline>"#;
        let outline = parse_outline(text).unwrap();
        assert_eq!(outline.title, "Energy");
        assert_eq!(outline.sections.len(), 2);
        assert_eq!(outline.sections[1].intent, "Offshore wind");
    }

    #[test]
    fn test_parse_outline_fenced_fallback() {
        let text = "Here is the plan:\n```json\n{\"sections\": [{\"title\": \"Intro\"}]}\n```";
        let outline = parse_outline(text).unwrap();
        assert_eq!(outline.title, "");
        assert_eq!(outline.sections[0].title, "Intro");
    }

    #[test]
    fn test_parse_outline_rejects_schema_mismatch() {
        let err = parse_outline(r#"<outline>{"sections": "none"}</outline>"#).unwrap_err();
        assert!(err.contains("schema"));
        assert!(parse_outline("no json at all").is_err());
    }

    #[test]
    fn test_parse_reflection() {
        let reply = parse_reflection(
            r#"<reflection>{"sufficient": false, "next_query": "solar cost 2024", "reasoning": "no prices"}</reflection>"#,
        )
        .unwrap();
        assert!(!reply.sufficient);
        assert_eq!(reply.next_query.as_deref(), Some("solar cost 2024"));

        let reply = parse_reflection(r#"{"sufficient": true, "next_query": null}"#).unwrap();
        assert!(reply.sufficient);
        assert_eq!(reply.next_query, None);
    }

    #[test]
    fn test_parse_reflection_malformed() {
        assert!(parse_reflection("<reflection>yes</reflection>").is_err());
        assert!(parse_reflection(r#"<reflection>{"sufficient": "maybe"}</reflection>"#).is_err());
    }

    #[test]
    fn test_parse_text_block() {
        assert_eq!(parse_text_block("<summary>\nShort.\n</summary>", Tag::Summary), "Short.");
        assert_eq!(parse_text_block("  plain text ", Tag::Summary), "plain text");
    }
}
