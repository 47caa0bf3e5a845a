//! Structured interpretation of raw model output.
//!
//! Providers are not guaranteed to emit well-formed JSON, so [`coerce_json`]
//! degrades through a fixed chain and never fails. [`Decision`] then exposes
//! the recognised fields and [`Decision::action`] applies the priority order
//! `tool > plan (non-terminal) > final > thought > raw`.

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Maximum characters kept when prose is wrapped as a final answer.
pub const FALLBACK_FINAL_CHARS: usize = 1000;

/// Coerce raw model text into a JSON object.
///
/// 1. Parse the whole trimmed text.
/// 2. Parse the last top-level `{...}` block in the text.
/// 3. Wrap the first [`FALLBACK_FINAL_CHARS`] characters as `{"final": text}`.
///
/// Empty input yields `{}`.
pub fn coerce_json(text: &str) -> Map<String, Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Map::new();
    }
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
        return obj;
    }
    if let Some(block) = last_top_level_object(trimmed) {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(block) {
            debug!("recovered json object from surrounding text");
            return obj;
        }
    }
    warn!("model output is not json, wrapping as final answer");
    let mut obj = Map::new();
    obj.insert(
        "final".to_string(),
        Value::String(trimmed.chars().take(FALLBACK_FINAL_CHARS).collect()),
    );
    obj
}

/// Locate the last balanced `{...}` block that is not nested in another block.
///
/// Braces inside JSON string literals are ignored.
fn last_top_level_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut last = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(begin) = start.take() {
                        last = Some(&text[begin..=idx]);
                    }
                }
            }
            _ => {}
        }
    }
    last
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

/// Recognised fields of one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub tool: Option<ToolCall>,
    pub plan: Option<Vec<String>>,
    pub final_answer: Option<String>,
    pub thought: Option<String>,
    /// The coerced object, kept for callers that want to inspect it.
    pub raw: Value,
}

/// Effect of a decision, resolved in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<'a> {
    Tool(&'a ToolCall),
    Final(&'a str),
    Thought(&'a str),
    Inconclusive,
}

impl Decision {
    /// Parse raw provider text. With `json_only == false` the text is the final answer.
    pub fn parse(text: &str, json_only: bool) -> Self {
        if json_only {
            Self::from_object(coerce_json(text))
        } else {
            Self::from_object(Map::from_iter([(
                "final".to_string(),
                Value::String(text.to_string()),
            )]))
        }
    }

    pub fn from_object(obj: Map<String, Value>) -> Self {
        let tool = obj.get("tool").and_then(parse_tool_call);
        let plan = match obj.get("plan") {
            Some(Value::Array(entries)) if !entries.is_empty() => {
                Some(entries.iter().map(plan_entry_text).collect())
            }
            _ => None,
        };
        let final_answer = obj
            .get("final")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let thought = obj
            .get("thought")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            tool,
            plan,
            final_answer,
            thought,
            raw: Value::Object(obj),
        }
    }

    /// Terminal effect of this decision. The plan update is applied separately
    /// because it never ends a step on its own.
    pub fn action(&self) -> Action<'_> {
        if let Some(call) = &self.tool {
            return Action::Tool(call);
        }
        if let Some(answer) = &self.final_answer {
            return Action::Final(answer);
        }
        if let Some(thought) = &self.thought {
            return Action::Thought(thought);
        }
        Action::Inconclusive
    }
}

/// A `tool` field counts as an invocation when it is an object. A missing
/// name becomes the empty string so the dispatcher reports it as unknown.
fn parse_tool_call(value: &Value) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let args = match obj.get("args") {
        Some(Value::Null) | None => json!({}),
        Some(args) => args.clone(),
    };
    Some(ToolCall { name, args })
}

fn plan_entry_text(entry: &Value) -> String {
    match entry {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_text_as_json() {
        let obj = coerce_json("  {\"final\": \"done\"}\n");
        assert_eq!(obj.get("final"), Some(&json!("done")));
    }

    #[test]
    fn extracts_last_top_level_block_from_prose() {
        let text = "Sure! first {\"thought\": \"a\"} then {\"final\": \"b {not} c\", \"n\": {\"x\": 1}} ok";
        let obj = coerce_json(text);
        assert_eq!(obj.get("final"), Some(&json!("b {not} c")));
        assert_eq!(obj.get("n"), Some(&json!({"x": 1})));
    }

    #[test]
    fn prose_is_wrapped_as_truncated_final() {
        let text = "x".repeat(1500);
        let obj = coerce_json(&text);
        let answer = obj.get("final").and_then(Value::as_str).expect("final");
        assert_eq!(answer.chars().count(), FALLBACK_FINAL_CHARS);
    }

    #[test]
    fn broken_block_falls_back_to_wrapping() {
        let obj = coerce_json("result: {\"final\": oops}");
        assert_eq!(obj.get("final"), Some(&json!("result: {\"final\": oops}")));
    }

    #[test]
    fn non_object_json_is_wrapped() {
        let obj = coerce_json("42");
        assert_eq!(obj.get("final"), Some(&json!("42")));
    }

    #[test]
    fn empty_text_is_empty_object() {
        assert!(coerce_json("   ").is_empty());
    }

    #[test]
    fn tool_takes_priority_over_final() {
        let decision = Decision::parse(
            r#"{"tool": {"name": "todo", "args": {"op": "list"}}, "final": "x"}"#,
            true,
        );
        match decision.action() {
            Action::Tool(call) => {
                assert_eq!(call.name, "todo");
                assert_eq!(call.args, json!({"op": "list"}));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn plan_is_collected_alongside_final() {
        let decision = Decision::parse(r#"{"plan": ["a", 2], "final": " done "}"#, true);
        assert_eq!(decision.plan, Some(vec!["a".to_string(), "2".to_string()]));
        assert_eq!(decision.action(), Action::Final("done"));
    }

    #[test]
    fn blank_final_falls_through_to_thought() {
        let decision = Decision::parse(r#"{"final": "  ", "thought": "hmm"}"#, true);
        assert_eq!(decision.action(), Action::Thought("hmm"));
    }

    #[test]
    fn missing_args_default_to_empty_object() {
        let decision = Decision::parse(r#"{"tool": {"name": "todo"}}"#, true);
        let call = decision.tool.expect("tool");
        assert_eq!(call.args, json!({}));
    }

    #[test]
    fn raw_text_mode_is_final() {
        let decision = Decision::parse("{\"tool\": {}}", false);
        assert_eq!(decision.action(), Action::Final("{\"tool\": {}}"));
    }

    #[test]
    fn nothing_recognised_is_inconclusive() {
        let decision = Decision::parse(r#"{"other": 1}"#, true);
        assert_eq!(decision.action(), Action::Inconclusive);
        assert_eq!(decision.raw, json!({"other": 1}));
    }
}
