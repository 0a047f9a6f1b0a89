//! Recovery heuristics for malformed structured payloads
//!
//! Each heuristic is a pure `fn(&str) -> Option<Value>`. The order lives in
//! `DEFAULT_CHAIN`; callers never see it.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// One numbered step of the recovery chain
#[derive(Clone, Copy)]
pub struct RecoveryAttempt {
    pub step: u8,
    pub name: &'static str,
    pub attempt: fn(&str) -> Option<Value>,
}

impl std::fmt::Debug for RecoveryAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.step, self.name)
    }
}

pub const DEFAULT_CHAIN: &[RecoveryAttempt] = &[
    RecoveryAttempt {
        step: 1,
        name: "normalize-and-retry",
        attempt: normalize_and_retry,
    },
    RecoveryAttempt {
        step: 2,
        name: "balanced-brace",
        attempt: balanced_brace,
    },
    RecoveryAttempt {
        step: 3,
        name: "object-before-markup",
        attempt: object_before_markup,
    },
    RecoveryAttempt {
        step: 4,
        name: "partial-error-envelope",
        attempt: partial_error_envelope,
    },
    RecoveryAttempt {
        step: 5,
        name: "largest-candidate",
        attempt: largest_candidate,
    },
];

/// Upper bound on parse attempts per heuristic
const MAX_CANDIDATES: usize = 64;

fn parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Strip a byte-order mark and surrounding whitespace, then parse
pub fn normalize_and_retry(raw: &str) -> Option<Value> {
    let trimmed = raw
        .trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace())
        .trim_end();
    if trimmed.len() == raw.len() {
        return None;
    }
    parse(trimmed)
}

/// Byte index of the `}` closing the object opened at `start`
///
/// String-aware: braces inside string literals and escaped quotes are skipped.
pub fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse from the first `{` to the brace that brings depth back to zero
pub fn balanced_brace(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = matching_brace(raw, start)?;
    parse(&raw[start..=end])
}

fn markup_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\}\s*<[!/]?[A-Za-z]").expect("static regex"))
}

/// Leading object immediately followed by a markup tag
pub fn object_before_markup(raw: &str) -> Option<Value> {
    let body = raw.trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace());
    if !body.starts_with('{') {
        return None;
    }
    markup_boundary()
        .find_iter(body)
        .take(MAX_CANDIDATES)
        .find_map(|m| parse(&body[..=m.start()]))
}

fn code_fragment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:code|status_code|status)"\s*:\s*"?(\d{3})\b"#).expect("static regex")
    })
}

fn message_fragment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:message|detail|error)"\s*:\s*"((?:[^"\\]|\\.)*)"?"#)
            .expect("static regex")
    })
}

/// Rebuild a minimal error object from a truncated server error envelope
pub fn partial_error_envelope(raw: &str) -> Option<Value> {
    let code = code_fragment()
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok());
    let message = message_fragment()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str()));

    if code.is_none() && message.is_none() {
        return None;
    }

    let mut envelope = json!({ "reconstructed": true });
    if let Some(code) = code {
        envelope["code"] = json!(code);
    }
    if let Some(message) = message {
        envelope["message"] = json!(message);
    }
    Some(envelope)
}

fn unescape(fragment: &str) -> String {
    // complete the literal and let serde handle escapes; a dangling backslash
    // from truncation is dropped
    let trimmed = fragment.strip_suffix('\\').unwrap_or(fragment);
    serde_json::from_str::<String>(&format!("\"{}\"", trimmed))
        .unwrap_or_else(|_| trimmed.replace("\\\"", "\""))
}

/// Every balanced `{...}` substring, longest first
///
/// Single pass with a stack of open-brace offsets. Quotes only count once an
/// object is open, so stray quotes in surrounding markup are ignored.
pub fn balanced_candidates(raw: &str) -> Vec<&str> {
    let mut open: Vec<usize> = Vec::new();
    let mut candidates: Vec<&str> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in raw.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    candidates.push(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }

    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    candidates.dedup();
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// First balanced candidate that parses, longest first
pub fn largest_candidate(raw: &str) -> Option<Value> {
    balanced_candidates(raw).into_iter().find_map(parse)
}
