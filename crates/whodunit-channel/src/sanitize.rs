//! JSON salvage for model-written responses

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use tracing::debug;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`+(?:json|JSON)?\n?").ok()).as_ref()
}

fn trailing_comma_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").ok()).as_ref()
}

/// Strip code fences, drop trailing commas, cut everything after the last
/// `}` and before the first `{`. Returns `"{}"` when there is no object.
pub fn clean_json(raw: &str) -> String {
    let s = match fence_re() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let s = match trailing_comma_re() {
        Some(re) => re.replace_all(&s, "$1").into_owned(),
        None => s,
    };

    let Some(end) = s.rfind('}') else {
        debug!("no closing brace in response, substituting empty object");
        return "{}".to_string();
    };
    let start = s[..end].find('{').unwrap_or(0);
    s[start..=end].trim().to_string()
}

/// Parse as-is, then retry on the cleaned text.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str(raw.trim()) {
        Ok(v) => Ok(v),
        Err(_) => serde_json::from_str(&clean_json(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(clean_json("```json\n{\"a\":1}\n```"), r#"{"a":1}"#);
    }

    #[test]
    fn removes_trailing_commas() {
        assert_eq!(clean_json(r#"{"a":[1,2,],}"#), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn truncates_garbage_both_sides() {
        assert_eq!(
            clean_json(r#"Sure! {"a":1} hope that helps"#),
            r#"{"a":1}"#
        );
    }

    #[test]
    fn no_brace_yields_empty_object() {
        assert_eq!(clean_json("I would rather not"), "{}");
    }

    #[test]
    fn lenient_parse_recovers() {
        let v: serde_json::Value = parse_lenient("```json\n{\"x\": true,}\n``` trailing").unwrap();
        assert_eq!(v["x"], true);
    }
}
