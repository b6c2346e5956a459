//! Wire-format decoding for planner and executor output.
//!
//! Both parsers accept JSON or XML and strip markdown code fences first.
//! `DocumentParser` is strict and fails with `ParseError`; `ResultParser`
//! never fails and falls back to the raw text.

pub mod document;
pub mod result;
mod xml;

pub use document::DocumentParser;
pub use result::{ParsedResult, ResultParser};

/// Strip a surrounding markdown code fence (```json, ```xml, or bare ```).
///
/// Text that already opens as a JSON or XML payload is only trimmed, so
/// backticks inside its string values are kept.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with(['{', '[', '<']) {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip optional language tag on same line
        let content_start = after.find('\n').map_or(0, |p| p + 1);
        let after = &after[content_start..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    trimmed.to_string()
}

/// XML when the first non-blank character is `<`.
fn looks_like_xml(text: &str) -> bool {
    text.trim_start().starts_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let input = "Here is the plan:\n```json\n{\"nodes\": []}\n```\nDone.";
        assert_eq!(strip_code_fences(input), "{\"nodes\": []}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_code_fences("```\n<plan/>\n```"), "<plan/>");
    }

    #[test]
    fn test_no_fence_is_trimmed() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_unterminated_fence_left_alone() {
        assert_eq!(strip_code_fences("```json\n{"), "```json\n{");
    }

    #[test]
    fn test_backticks_inside_payload_are_kept() {
        let input = "{\"directResult\": \"run ```ls``` first\"}";
        assert_eq!(strip_code_fences(input), input);
        assert_eq!(strip_code_fences("<goal>```x```</goal>"), "<goal>```x```</goal>");
    }

    #[test]
    fn test_format_detection() {
        assert!(looks_like_xml("  <plan/>"));
        assert!(!looks_like_xml("{\"nodes\": []}"));
    }
}
