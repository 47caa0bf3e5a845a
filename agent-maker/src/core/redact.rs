//! Trace redaction applied at persistence time.
//!
//! Redaction always returns a new event; the in-memory trace is never touched.
//! Keys containing a sensitive term are replaced at every privacy level. Under
//! `strict`, every remaining string becomes the placeholder and model output is
//! dropped entirely; otherwise long strings are truncated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::core::types::{TraceEvent, TraceKind};

/// Case-insensitive substrings marking a key as sensitive.
pub const SENSITIVE_TERMS: [&str; 9] = [
    "api_key",
    "authorization",
    "token",
    "password",
    "secret",
    "openid",
    "sessionid",
    "cookie",
    "openai_api_key",
];

/// Tools whose results carry file contents or process output.
const CONTENT_TOOLS: [&str; 5] = ["fs.read", "fs.write", "fs.patch", "test.run", "shell"];
const CONTENT_FIELDS: [&str; 4] = ["content", "stdout", "stderr", "patch"];

/// Nesting beyond this depth is not walked.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Off,
    #[default]
    Standard,
    Strict,
}

impl Privacy {
    /// Parse a privacy level, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Privacy::Off),
            "standard" => Some(Privacy::Standard),
            "strict" => Some(Privacy::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedactError {
    TooDeep { limit: usize },
}

impl fmt::Display for RedactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedactError::TooDeep { limit } => {
                write!(f, "trace data nested deeper than {limit} levels")
            }
        }
    }
}

impl std::error::Error for RedactError {}

/// Pure event transformer configured by privacy level and length cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redactor {
    privacy: Privacy,
    placeholder: String,
    max_len: usize,
}

impl Redactor {
    pub fn new(privacy: Privacy, placeholder: impl Into<String>, max_len: usize) -> Self {
        Self {
            privacy,
            placeholder: placeholder.into(),
            max_len,
        }
    }

    pub fn privacy(&self) -> Privacy {
        self.privacy
    }

    fn strict(&self) -> bool {
        self.privacy == Privacy::Strict
    }

    /// Redact an event. Never fails: if redaction cannot complete, the
    /// original event is returned unchanged and a warning is logged.
    pub fn redact(&self, event: &TraceEvent) -> TraceEvent {
        match self.try_redact(event) {
            Ok(redacted) => redacted,
            Err(err) => {
                warn!(kind = event.kind.as_str(), err = %err, "redaction failed, keeping original event");
                event.clone()
            }
        }
    }

    pub fn try_redact(&self, event: &TraceEvent) -> Result<TraceEvent, RedactError> {
        let data = match (&event.kind, &event.data) {
            (TraceKind::ModelOutput, _) if self.strict() => json!({"omitted": true}),
            (TraceKind::Tool, Value::Object(obj)) => self.redact_tool_data(obj)?,
            (_, data) => self.redact_value(data, 0)?,
        };
        Ok(TraceEvent {
            kind: event.kind.clone(),
            data,
            timestamp: event.timestamp,
        })
    }

    fn redact_tool_data(&self, obj: &Map<String, Value>) -> Result<Value, RedactError> {
        let mut redacted = self.redact_map(obj, 0)?;
        let name = obj.get("name").and_then(Value::as_str).unwrap_or_default();
        if !CONTENT_TOOLS.contains(&name) {
            return Ok(redacted);
        }
        if let Some(Value::Object(result)) = redacted.get_mut("result") {
            for field in CONTENT_FIELDS {
                if let Some(value) = result.get_mut(field) {
                    *value = self.redact_scalar(value, self.strict());
                }
            }
        }
        Ok(redacted)
    }

    fn redact_value(&self, value: &Value, depth: usize) -> Result<Value, RedactError> {
        if depth > MAX_DEPTH {
            return Err(RedactError::TooDeep { limit: MAX_DEPTH });
        }
        match value {
            Value::Object(map) => self.redact_map(map, depth),
            Value::Array(items) => items
                .iter()
                .map(|item| self.redact_value(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            scalar => Ok(self.redact_scalar(scalar, self.strict())),
        }
    }

    fn redact_map(&self, map: &Map<String, Value>, depth: usize) -> Result<Value, RedactError> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let redacted = if is_sensitive_key(key) {
                Value::String(self.placeholder.clone())
            } else {
                self.redact_value(value, depth + 1)?
            };
            out.insert(key.clone(), redacted);
        }
        Ok(Value::Object(out))
    }

    fn redact_scalar(&self, value: &Value, strict: bool) -> Value {
        match value {
            Value::String(_) if strict => Value::String(self.placeholder.clone()),
            Value::String(s) => Value::String(truncate_with_ellipsis(s, self.max_len)),
            other => other.clone(),
        }
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_TERMS.iter().any(|term| lowered.contains(term))
}

/// Truncate to at most `max_len` characters, ending in `...` when shortened.
pub fn truncate_with_ellipsis(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: TraceKind, data: Value) -> TraceEvent {
        TraceEvent::new(kind, data)
    }

    #[test]
    fn sensitive_keys_are_replaced_at_any_depth_and_level() {
        for privacy in [Privacy::Off, Privacy::Standard, Privacy::Strict] {
            let redactor = Redactor::new(privacy, "***", 2000);
            let original = event(
                TraceKind::Start,
                json!({
                    "task": "t",
                    "nested": [{"deeper": {"X-Api_Key": 12, "Cookie": {"a": "b"}}}],
                    "Authorization": "Bearer abc",
                }),
            );
            let redacted = redactor.redact(&original);
            assert_eq!(redacted.data["nested"][0]["deeper"]["X-Api_Key"], "***");
            assert_eq!(redacted.data["nested"][0]["deeper"]["Cookie"], "***");
            assert_eq!(redacted.data["Authorization"], "***");
        }
    }

    #[test]
    fn strict_replaces_strings_and_keeps_other_scalars() {
        let redactor = Redactor::new(Privacy::Strict, "***", 2000);
        let redacted = redactor.redact(&event(
            TraceKind::Plan,
            json!({"added": ["a", "b"], "count": 2, "flag": true, "none": null}),
        ));
        assert_eq!(
            redacted.data,
            json!({"added": ["***", "***"], "count": 2, "flag": true, "none": null})
        );
    }

    #[test]
    fn strict_omits_model_output() {
        let redactor = Redactor::new(Privacy::Strict, "***", 2000);
        let redacted = redactor.redact(&event(TraceKind::ModelOutput, json!({"raw": "text"})));
        assert_eq!(redacted.data, json!({"omitted": true}));
    }

    #[test]
    fn standard_truncates_long_strings() {
        let redactor = Redactor::new(Privacy::Standard, "***", 10);
        let redacted = redactor.redact(&event(
            TraceKind::ModelOutput,
            json!({"raw": "abcdefghijklmnop", "short": "abc"}),
        ));
        assert_eq!(redacted.data["raw"], "abcdefg...");
        assert_eq!(redacted.data["short"], "abc");
    }

    #[test]
    fn strict_hides_file_content_in_tool_results() {
        let redactor = Redactor::new(Privacy::Strict, "[hidden]", 2000);
        let redacted = redactor.redact(&event(
            TraceKind::Tool,
            json!({
                "name": "fs.read",
                "args": {"path": "a.txt"},
                "result": {"ok": true, "content": "secret stuff", "truncated": false},
            }),
        ));
        assert_eq!(redacted.data["result"]["content"], "[hidden]");
        assert_eq!(redacted.data["result"]["ok"], true);
        assert_eq!(redacted.data["name"], "[hidden]");
    }

    #[test]
    fn standard_truncates_shell_output() {
        let redactor = Redactor::new(Privacy::Standard, "***", 8);
        let redacted = redactor.redact(&event(
            TraceKind::Tool,
            json!({
                "name": "shell",
                "args": {"cmd": "ls"},
                "result": {"ok": true, "stdout": "0123456789", "code": 0},
            }),
        ));
        assert_eq!(redacted.data["result"]["stdout"], "01234...");
        assert_eq!(redacted.data["result"]["code"], 0);
        assert_eq!(redacted.data["name"], "shell");
    }

    #[test]
    fn redaction_does_not_mutate_original() {
        let redactor = Redactor::new(Privacy::Strict, "***", 2000);
        let original = event(TraceKind::Start, json!({"task": "keep me", "token": "t"}));
        let snapshot = original.clone();
        let _ = redactor.redact(&original);
        assert_eq!(original, snapshot);
    }

    #[test]
    fn too_deep_data_falls_back_to_original() {
        let mut data = json!("leaf");
        for _ in 0..(MAX_DEPTH + 5) {
            data = json!([data]);
        }
        let original = event(TraceKind::Plan, data);
        let redactor = Redactor::new(Privacy::Strict, "***", 2000);

        assert!(redactor.try_redact(&original).is_err());
        assert_eq!(redactor.redact(&original), original);
    }

    #[test]
    fn privacy_parse_is_lenient_about_case() {
        assert_eq!(Privacy::parse(" STRICT "), Some(Privacy::Strict));
        assert_eq!(Privacy::parse("loud"), None);
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate_with_ellipsis("héllo wörld", 8), "héllo...");
        assert_eq!(truncate_with_ellipsis("short", 8), "short");
    }
}
