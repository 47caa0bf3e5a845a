//! Serializable agent blueprint.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const DEFAULT_AGENT_NAME: &str = "agent";

/// `{name, description, tools}` blueprint consumed once to build an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub tools: Vec<String>,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            description: String::new(),
            tools: Vec::new(),
        }
    }
}

impl AgentSpec {
    /// Read a spec from a JSON value.
    ///
    /// The root must be an object. Missing fields take defaults, unknown fields
    /// are ignored, non-string scalars are rendered as JSON text, and a `tools`
    /// value that is not an array is treated as empty.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(obj) = value else {
            bail!("agent spec must be a JSON object");
        };
        Ok(Self::from_map(obj))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    fn from_map(obj: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        let tools = match obj.get("tools") {
            Some(Value::Array(items)) => items.iter().map(text_of).collect(),
            _ => Vec::new(),
        };
        Self {
            name: field_text(obj, "name").unwrap_or(defaults.name),
            description: field_text(obj, "description").unwrap_or(defaults.description),
            tools,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "tools": self.tools,
        })
    }
}

fn field_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).filter(|value| !value.is_null()).map(text_of)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
