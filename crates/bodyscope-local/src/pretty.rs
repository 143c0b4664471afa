//! Best-effort pretty-printing for display.
//!
//! Only JSON is reformatted. Anything that fails to parse is shown as-is: the classifier's
//! kind is a hint, not a validity guarantee.

use crate::config::{InspectorConfig, DEFAULT_PRETTY_MAX_CHARS, DEFAULT_PRETTY_TRUNCATE_CHARS};
use bodyscope_core::ContentKind;
use serde::Serialize;
use serde_json::ser::PrettyFormatter as JsonPrettyFormatter;

/// Appended when the size ceiling cuts the text.
pub const TRUNCATION_MARKER: &str = "\n\n[bodyscope: truncated, body too large to format]";

const INDENT: &[u8] = b"    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrettyFormatter {
    max_chars: usize,
    truncate_chars: usize,
}

impl Default for PrettyFormatter {
    fn default() -> Self {
        Self::with_limits(DEFAULT_PRETTY_MAX_CHARS, DEFAULT_PRETTY_TRUNCATE_CHARS)
    }
}

impl PrettyFormatter {
    /// `truncate_chars` is capped at `max_chars`.
    pub fn with_limits(max_chars: usize, truncate_chars: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            truncate_chars: truncate_chars.min(max_chars),
        }
    }

    pub fn from_config(cfg: &InspectorConfig) -> Self {
        Self::with_limits(cfg.pretty_max_chars, cfg.pretty_truncate_chars)
    }

    pub fn format(&self, kind: ContentKind, text: &str) -> String {
        if kind != ContentKind::Json {
            return text.to_string();
        }
        // Byte length bounds char count from above; only count when it might matter.
        if text.len() > self.max_chars && text.chars().count() > self.max_chars {
            tracing::debug!(
                max_chars = self.max_chars,
                "skipping json formatting for oversized body"
            );
            let mut out: String = text.chars().take(self.truncate_chars).collect();
            out.push_str(TRUNCATION_MARKER);
            return out;
        }
        match reformat_json(text) {
            Some(s) => s,
            None => {
                tracing::debug!("body classified as json did not parse; showing raw");
                text.to_string()
            }
        }
    }
}

fn reformat_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let mut buf = Vec::with_capacity(text.len() + text.len() / 2);
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, JsonPrettyFormatter::with_indent(INDENT));
    value.serialize(&mut ser).ok()?;
    String::from_utf8(buf).ok()
}

/// [`PrettyFormatter::format`] with the default limits.
pub fn pretty_print(kind: ContentKind, text: &str) -> String {
    PrettyFormatter::default().format(kind, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn json_gets_four_space_indent_and_keeps_key_order() {
        assert_eq!(pretty_print(ContentKind::Json, r#"{"a":1}"#), "{\n    \"a\": 1\n}");
        let out = pretty_print(ContentKind::Json, r#"{"z":[1,2],"a":{"k":1.50}}"#);
        assert_eq!(
            out,
            "{\n    \"z\": [\n        1,\n        2\n    ],\n    \"a\": {\n        \"k\": 1.50\n    }\n}"
        );
    }

    #[test]
    fn invalid_json_is_returned_unchanged() {
        let raw = "{\"a\": 1,,}";
        assert_eq!(pretty_print(ContentKind::Json, raw), raw);
    }

    #[test]
    fn non_json_kinds_pass_through() {
        let xml = "<a><b/></a>";
        assert_eq!(pretty_print(ContentKind::Xml, xml), xml);
        assert_eq!(pretty_print(ContentKind::PlainText, "{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn oversized_json_is_truncated_with_marker() {
        let big = format!("[{}]", vec!["1"; 300_000].join(","));
        assert!(big.chars().count() > 500_000);
        let out = pretty_print(ContentKind::Json, &big);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.chars().count() <= 100_000 + TRUNCATION_MARKER.chars().count());
        assert!(big.starts_with(out.trim_end_matches(TRUNCATION_MARKER)));
    }

    #[test]
    fn custom_limits_apply() {
        let f = PrettyFormatter::with_limits(10, 50);
        let out = f.format(ContentKind::Json, r#"{"key":"value"}"#);
        assert_eq!(out, format!("{{\"key\":\"va{TRUNCATION_MARKER}"));
    }

    fn json_value() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-z \"\\\\é]{0,8}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                prop::collection::vec(("[a-z]{1,4}", inner), 0..4).prop_map(|kv| {
                    serde_json::Value::Object(kv.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn formatting_is_idempotent(v in json_value()) {
            let compact = serde_json::to_string(&v).unwrap();
            let once = pretty_print(ContentKind::Json, &compact);
            let twice = pretty_print(ContentKind::Json, &once);
            prop_assert_eq!(once, twice);
        }
    }
}
