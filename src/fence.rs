//! Normalisation of model text before it is parsed as JSON.
//!
//! Models are told not to wrap their answer in markdown, but they often do
//! anyway. [`strip_json_fence`] removes at most one opening marker and one
//! closing marker and leaves every other byte alone.

use std::borrow::Cow;

const OPENING_JSON: &str = "```json";
const FENCE: &str = "```";

/// Remove a single ```` ```json ```` / ```` ``` ```` pair from `text`.
///
/// The first ```` ```json ```` is removed, or the first bare ```` ``` ```` when
/// no tagged opener exists, followed by the first remaining ```` ``` ````.
/// Text without any marker is returned borrowed and unchanged, so applying
/// the function to already-unfenced JSON is a no-op.
pub fn strip_json_fence(text: &str) -> Cow<'_, str> {
    if !text.contains(FENCE) {
        return Cow::Borrowed(text);
    }

    let opener = if text.contains(OPENING_JSON) {
        OPENING_JSON
    } else {
        FENCE
    };
    let without_opener = text.replacen(opener, "", 1);
    Cow::Owned(without_opener.replacen(FENCE, "", 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_plain_json_untouched() {
        let raw = r#"{"stage":"think","thought":"hm"}"#;
        let stripped = strip_json_fence(raw);
        assert!(matches!(stripped, Cow::Borrowed(_)));
        assert_eq!(stripped, raw);
        assert_eq!(strip_json_fence(&stripped), raw);
    }

    #[test]
    fn strips_tagged_fence() {
        let raw = "```json\n{\"stage\":\"output\"}\n```";
        let stripped = strip_json_fence(raw);
        assert_eq!(stripped.trim(), r#"{"stage":"output"}"#);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["stage"], "output");
    }

    #[test]
    fn strips_bare_fence() {
        let stripped = strip_json_fence("```\n{\"a\":1}\n```");
        assert_eq!(stripped.trim(), r#"{"a":1}"#);
    }

    #[test]
    fn removes_only_one_pair() {
        let stripped = strip_json_fence("```json {} ``` tail ```");
        assert_eq!(stripped, " {}  tail ```");
    }

    #[test]
    fn stripping_twice_matches_stripping_once_for_single_pair() {
        let once = strip_json_fence("```json\n{\"x\":true}\n```").into_owned();
        let twice = strip_json_fence(&once).into_owned();
        assert_eq!(once, twice);
    }
}
