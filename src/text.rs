//! Small text helpers shared by the writing and rendering stages.

use regex::Regex;
use std::sync::LazyLock;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+|[。！？]+\s*").unwrap());

/// The first `max_chars` characters of `text`.
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Split prose into trimmed, non-empty sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace, or at a
/// full-width stop. Line breaks inside a paragraph are treated as spaces.
pub fn sentences(text: &str) -> Vec<String> {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(&flat) {
        let sentence = flat[start..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence.to_string());
        }
        start = m.end();
    }
    let tail = flat[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

/// Lines of Markdown prose with headings, fences and table rows removed.
pub fn prose(markdown: &str) -> String {
    let mut in_fence = false;
    markdown
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") {
                in_fence = !in_fence;
                return false;
            }
            !in_fence && !trimmed.starts_with('#') && !trimmed.starts_with('|')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whole sentences from the start of `markdown` totalling at most
/// `max_chars`. A first sentence longer than the limit is clipped with an
/// ellipsis.
pub fn excerpt(markdown: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for sentence in sentences(&prose(markdown)) {
        let needed = sentence.chars().count() + usize::from(!out.is_empty());
        if out.chars().count() + needed > max_chars {
            if out.is_empty() {
                let keep = max_chars.saturating_sub(3);
                out = format!("{}...", clip(&sentence, keep).trim_end());
            }
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&sentence);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_is_char_safe() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("hi", 10), "hi");
    }

    #[test]
    fn test_sentences() {
        let s = sentences("Solar grew 24%.  Wind\nfollowed! Why? Because");
        assert_eq!(s, vec!["Solar grew 24%.", "Wind followed!", "Why?", "Because"]);
        assert!(sentences("   ").is_empty());
        assert_eq!(sentences("装机容量增加。成本降低"), vec!["装机容量增加。", "成本降低"]);
    }

    #[test]
    fn test_prose_skips_headings_and_code() {
        let md = "### Heading\nText here.\n```\nlet x = 1.\n```\n| a | b |\nMore.";
        assert_eq!(prose(md), "Text here.\nMore.");
    }

    #[test]
    fn test_excerpt_is_sentence_bounded() {
        let md = "First sentence here. Second one is longer than it looks. Third.";
        assert_eq!(excerpt(md, 25), "First sentence here.");
        assert_eq!(excerpt(md, 200), md);
        assert_eq!(excerpt("An extremely long opening sentence.", 10), "An extr...");
    }
}
