//! Recovers the posts array from raw model output.
//!
//! Models wrap JSON in code fences, add chatter around it or leave trailing
//! commas behind. The parser strips fences, slices the outermost `{...}` and,
//! when the first parse fails, retries once after removing trailing commas.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{GenerateError, Result};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json)?").expect("fence regex"));
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"));
static AGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,4})\s*(hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s|days?|d)\b")
        .expect("age regex")
});

pub const DEFAULT_FRESHNESS: &str = "Fresh";

/// One raw post as the model returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePost {
    pub text: String,
    pub freshness: Option<String>,
}

pub fn parse_candidates(raw: &str) -> Result<Vec<CandidatePost>> {
    let unfenced = FENCE_RE.replace_all(raw, "");
    let body = outermost_object(&unfenced)
        .ok_or_else(|| GenerateError::MalformedResponse("no JSON object in output".into()))?;

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(first) => {
            let repaired = TRAILING_COMMA_RE.replace_all(body, "$1");
            serde_json::from_str(&repaired).map_err(|_| {
                GenerateError::MalformedResponse(format!("invalid JSON: {first}"))
            })?
        }
    };

    let field = value
        .get("tweets")
        .or_else(|| value.get("posts"))
        .ok_or_else(|| GenerateError::MalformedResponse("missing \"tweets\" field".into()))?;
    let items = field
        .as_array()
        .ok_or_else(|| GenerateError::MalformedResponse("\"tweets\" is not an array".into()))?;

    Ok(items.iter().filter_map(candidate_from).collect())
}

fn outermost_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

fn candidate_from(item: &Value) -> Option<CandidatePost> {
    let (text, freshness) = match item {
        Value::String(s) => (s.as_str(), None),
        Value::Object(map) => {
            let text = map.get("text").and_then(Value::as_str)?;
            let freshness = ["sourceAge", "source_age", "freshness", "age"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            (text, freshness)
        }
        _ => return None,
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(CandidatePost {
        text: text.to_string(),
        freshness,
    })
}

/// Map a model-reported age onto the `"Nh ago"` form.
///
/// Hours are kept (capped at 24), minutes and seconds round up to `"1h ago"`,
/// days become `"24h ago"`. Anything else falls back to `default`.
pub fn normalize_freshness(raw: Option<&str>, default: &str) -> String {
    let Some(raw) = raw else {
        return default.to_string();
    };
    let Some(caps) = AGE_RE.captures(raw) else {
        return default.to_string();
    };
    let n: u32 = caps[1].parse().unwrap_or(0);
    let unit = caps[2].to_ascii_lowercase();
    let hours = match unit.chars().next() {
        Some('h') => n.clamp(1, 24),
        Some('m') | Some('s') => 1,
        Some('d') => 24,
        _ => return default.to_string(),
    };
    format!("{hours}h ago")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_object_with_chatter() {
        let raw = "Sure! Here you go:\n```json\n{\"tweets\":[{\"text\":\"Tool: one\",\"sourceAge\":\"3h ago\"}]}\n```\nEnjoy.";
        let posts = parse_candidates(raw).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "Tool: one");
        assert_eq!(posts[0].freshness.as_deref(), Some("3h ago"));
    }

    #[test]
    fn repairs_trailing_commas() {
        let raw = r#"{"tweets":[{"text":"a",},{"text":"b"},],}"#;
        let posts = parse_candidates(raw).unwrap();
        assert_eq!(posts.len(), 2);
    }

    #[test]
    fn accepts_posts_field_and_plain_strings() {
        let raw = r#"{"posts":["first", {"text":"second","freshness":"5m ago"}, {"text":"   "}, 42]}"#;
        let posts = parse_candidates(raw).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].freshness, None);
        assert_eq!(posts[1].freshness.as_deref(), Some("5m ago"));
    }

    #[test]
    fn missing_or_non_array_field_is_malformed() {
        for raw in [
            "no json at all",
            r#"{"items":[]}"#,
            r#"{"tweets":"nope"}"#,
            r#"{"tweets":[{"text":"x"}"#,
        ] {
            let err = parse_candidates(raw).unwrap_err();
            assert!(matches!(err, GenerateError::MalformedResponse(_)), "{raw}");
        }
    }

    #[test]
    fn freshness_maps_to_hours() {
        assert_eq!(normalize_freshness(Some("3h ago"), "Fresh"), "3h ago");
        assert_eq!(normalize_freshness(Some("5 hours ago"), "Fresh"), "5h ago");
        assert_eq!(normalize_freshness(Some("45m ago"), "Fresh"), "1h ago");
        assert_eq!(normalize_freshness(Some("30 seconds ago"), "Fresh"), "1h ago");
        assert_eq!(normalize_freshness(Some("2 days ago"), "Fresh"), "24h ago");
        assert_eq!(normalize_freshness(Some("0h ago"), "Fresh"), "1h ago");
        assert_eq!(normalize_freshness(Some("90h ago"), "Fresh"), "24h ago");
        assert_eq!(normalize_freshness(Some("today"), "Fresh"), "Fresh");
        assert_eq!(normalize_freshness(None, "Backfill"), "Backfill");
    }
}
