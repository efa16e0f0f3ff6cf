//! Parsing of model output into field suggestions.
//!
//! Models wrap JSON in markdown fences and chatter around it; parsing is
//! therefore lenient and never fails outright. Text that yields no JSON
//! object is surfaced raw so nothing the model said is lost.

use crate::snapshot::SuggestionSet;

/// Outcome of parsing a completion into suggestions.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedSuggestions {
    Parsed(SuggestionSet),
    /// No JSON object could be recovered; the full reply text.
    Raw(String),
}

/// Remove a leading/trailing markdown code fence, with or without a
/// language tag.
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line if present.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// The first '{' through the last '}', when both exist in order.
pub fn extract_json_fragment(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Recover a suggestion map from raw model output.
pub fn parse_suggestions(reply: &str) -> ParsedSuggestions {
    let stripped = strip_markdown_fences(reply);
    let candidate = extract_json_fragment(stripped).unwrap_or(stripped);
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Object(map)) => {
            ParsedSuggestions::Parsed(SuggestionSet::from_json_object(&map))
        }
        _ => ParsedSuggestions::Raw(reply.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_object() {
        let parsed = parse_suggestions(r#"{"firstName":"Jane"}"#);
        match parsed {
            ParsedSuggestions::Parsed(set) => assert_eq!(set.get("firstName"), Some("Jane")),
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_json_wrapped_in_chatter() {
        let parsed = parse_suggestions("Here you go: {\"firstName\":\"Jane\"} thanks");
        match parsed {
            ParsedSuggestions::Parsed(set) => {
                assert_eq!(set.len(), 1);
                assert_eq!(set.get("firstName"), Some("Jane"));
            }
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let reply = "```json\n{\"email\":\"jane@example.com\"}\n```";
        match parse_suggestions(reply) {
            ParsedSuggestions::Parsed(set) => {
                assert_eq!(set.get("email"), Some("jane@example.com"));
            }
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_brace_free_text_is_raw() {
        let reply = "I cannot determine the field values for this page.";
        assert_eq!(
            parse_suggestions(reply),
            ParsedSuggestions::Raw(reply.to_string())
        );
    }

    #[test]
    fn test_malformed_json_is_raw() {
        let reply = "{not json at all]";
        assert_eq!(
            parse_suggestions(reply),
            ParsedSuggestions::Raw(reply.to_string())
        );
    }

    #[test]
    fn test_strip_fences_without_language() {
        assert_eq!(strip_markdown_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("no fences"), "no fences");
    }
}
