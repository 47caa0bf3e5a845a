//! Shared types for conversation state, plans, and traces.
//!
//! These types are the contract between the agent loop, the tools, and the
//! trace writer. Everything here serializes to the JSON shapes that are
//! replayed to providers and persisted in trace files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool name for `tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Message shape handed to providers (no timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            name: message.name.clone(),
        }
    }
}

/// Progress of a plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub text: String,
    pub status: PlanStatus,
}

/// Kind of a recorded trace event.
///
/// Serialized as the bare string stored in the `type` field of trace lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Start,
    ModelOutput,
    Tool,
    Plan,
    #[serde(untagged)]
    Other(String),
}

impl TraceKind {
    pub fn as_str(&self) -> &str {
        match self {
            TraceKind::Start => "start",
            TraceKind::ModelOutput => "model_output",
            TraceKind::Tool => "tool",
            TraceKind::Plan => "plan",
            TraceKind::Other(name) => name,
        }
    }
}

/// Immutable record of one runtime occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(rename = "type")]
    pub kind: TraceKind,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TraceEvent {
    pub fn new(kind: TraceKind, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_event_serializes_type_field() {
        let event = TraceEvent::new(TraceKind::ModelOutput, json!({"raw": "hi"}));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "model_output");
        assert_eq!(value["data"]["raw"], "hi");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn custom_trace_kind_round_trips_as_plain_string() {
        let event = TraceEvent::new(TraceKind::Other("note".to_string()), json!({}));
        let line = serde_json::to_string(&event).expect("serialize");
        assert!(line.contains("\"type\":\"note\""));
        let parsed: TraceEvent = serde_json::from_str(&line).expect("parse");
        assert_eq!(parsed.kind, TraceKind::Other("note".to_string()));
    }

    #[test]
    fn plan_status_uses_snake_case() {
        let value = serde_json::to_value(PlanStatus::InProgress).expect("serialize");
        assert_eq!(value, json!("in_progress"));
    }
}
