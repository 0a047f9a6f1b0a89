//! Response decoding with recovery
//!
//! Structured bodies go through the primary JSON parse first. When that fails
//! the recovery chain runs in order and the first heuristic that yields a
//! value wins. If none does, decoding ends in a `DiagnosticFailure` carrying
//! enough of the input to tell what the upstream actually sent.

pub mod heuristics;

pub use heuristics::{RecoveryAttempt, DEFAULT_CHAIN};

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Maximum number of characters kept in a diagnostic sample
pub const SAMPLE_CHARS: usize = 256;

/// Declared kind of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Structured,
    Text,
}

impl ContentKind {
    /// Classify from a `Content-Type` header
    ///
    /// Only `text/plain` counts as text: gateways label injected error pages
    /// as html, and those still go through recovery.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.to_ascii_lowercase().starts_with("text/plain") => ContentKind::Text,
            _ => ContentKind::Structured,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Structured(Value),
    Text(String),
}

impl ParsedValue {
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ParsedValue::Structured(value) => Some(value),
            ParsedValue::Text(_) => None,
        }
    }

    pub fn into_structured(self) -> Option<Value> {
        match self {
            ParsedValue::Structured(value) => Some(value),
            ParsedValue::Text(_) => None,
        }
    }
}

/// Terminal state of the recovery chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticFailure {
    /// Error reported by the primary parse
    pub error: String,
    /// Prefix of the raw text, at most `SAMPLE_CHARS` characters
    pub sample: String,
    /// Length of the raw text in bytes
    pub length: usize,
}

impl DiagnosticFailure {
    pub fn new(error: impl Into<String>, raw: &str) -> Self {
        Self {
            error: error.into(),
            sample: raw.chars().take(SAMPLE_CHARS).collect(),
            length: raw.len(),
        }
    }
}

impl fmt::Display for DiagnosticFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes, starts with {:?})", self.error, self.length, self.sample)
    }
}

impl std::error::Error for DiagnosticFailure {}

/// Primary parser plus an ordered recovery chain
#[derive(Debug, Clone)]
pub struct Decoder {
    chain: Vec<RecoveryAttempt>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_CHAIN.to_vec())
    }
}

impl Decoder {
    pub fn new(chain: Vec<RecoveryAttempt>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &[RecoveryAttempt] {
        &self.chain
    }

    pub fn decode(&self, raw: &str, kind: ContentKind) -> Result<ParsedValue, DiagnosticFailure> {
        if kind == ContentKind::Text {
            return Ok(ParsedValue::Text(raw.to_string()));
        }
        if raw.trim().is_empty() {
            return Err(DiagnosticFailure::new("empty body", raw));
        }

        let primary_error = match serde_json::from_str::<Value>(raw) {
            Ok(value) => return Ok(ParsedValue::Structured(value)),
            Err(e) => e.to_string(),
        };

        self.recover(raw)
            .map(ParsedValue::Structured)
            .ok_or_else(|| {
                warn!(
                    "Payload unrecoverable after {} heuristics: {} ({} bytes)",
                    self.chain.len(),
                    primary_error,
                    raw.len()
                );
                DiagnosticFailure::new(primary_error, raw)
            })
    }

    fn recover(&self, raw: &str) -> Option<Value> {
        self.chain.iter().find_map(|attempt| {
            let value = (attempt.attempt)(raw)?;
            debug!("Payload recovered by heuristic #{} {}", attempt.step, attempt.name);
            Some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(raw: &str) -> Result<ParsedValue, DiagnosticFailure> {
        Decoder::default().decode(raw, ContentKind::Structured)
    }

    #[test]
    fn test_well_formed_matches_serde() {
        let raw = r#"{"cpu_usage": 41.5, "nodes": [1, 2], "ok": true, "n": null}"#;
        let expected: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(decode(raw).unwrap(), ParsedValue::Structured(expected));
        assert_eq!(decode("[1,2,3]").unwrap(), ParsedValue::Structured(json!([1, 2, 3])));
    }

    #[test]
    fn test_trailing_markup_discarded() {
        assert_eq!(
            decode("{\"a\":1}<html>x</html>").unwrap(),
            ParsedValue::Structured(json!({"a": 1}))
        );
    }

    #[test]
    fn test_bom_and_whitespace() {
        let plain = decode("{\"a\":[1,2]}").unwrap();
        assert_eq!(decode("\u{feff}\r\n  {\"a\":[1,2]}").unwrap(), plain);
    }

    #[test]
    fn test_truncated_error_envelope() {
        let value = decode(r#"{"code":500,"message":"Internal Server Err"#)
            .unwrap()
            .into_structured()
            .unwrap();
        assert_eq!(value["code"], 500);
        assert_eq!(value["message"], "Internal Server Err");
    }

    #[test]
    fn test_diagnostic_failure() {
        let raw = format!("<html><body>{}</body></html>", "Bad Gateway ".repeat(60));
        let failure = decode(&raw).unwrap_err();
        assert!(raw.starts_with(&failure.sample));
        assert_eq!(failure.sample.chars().count(), SAMPLE_CHARS);
        assert_eq!(failure.length, raw.len());
        assert!(!failure.error.is_empty());
    }

    #[test]
    fn test_empty_body() {
        let failure = decode("   ").unwrap_err();
        assert_eq!(failure.error, "empty body");
        assert_eq!(failure.length, 3);
    }

    #[test]
    fn test_text_kind_skips_parsing() {
        let parsed = Decoder::default().decode("ok", ContentKind::Text).unwrap();
        assert_eq!(parsed, ParsedValue::Text("ok".into()));
    }

    #[test]
    fn test_custom_chain() {
        fn always_empty(_: &str) -> Option<Value> {
            Some(json!({}))
        }
        let decoder = Decoder::new(vec![RecoveryAttempt {
            step: 1,
            name: "always-empty",
            attempt: always_empty,
        }]);
        assert_eq!(
            decoder.decode("garbage", ContentKind::Structured).unwrap(),
            ParsedValue::Structured(json!({}))
        );

        let strict = Decoder::new(Vec::new());
        assert!(strict.decode("{\"a\":1} trailing", ContentKind::Structured).is_err());
    }

    #[test]
    fn test_content_kind_from_header() {
        assert_eq!(
            ContentKind::from_content_type(Some("application/json; charset=utf-8")),
            ContentKind::Structured
        );
        assert_eq!(ContentKind::from_content_type(Some("text/plain")), ContentKind::Text);
        assert_eq!(
            ContentKind::from_content_type(Some("text/html; charset=utf-8")),
            ContentKind::Structured
        );
        assert_eq!(ContentKind::from_content_type(None), ContentKind::Structured);
    }
}
