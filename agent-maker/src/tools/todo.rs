//! `todo`: manage the plan held in conversation state.

use anyhow::{Result, bail};
use serde_json::{Value, json};

use crate::core::state::ConversationState;
use crate::core::types::PlanStatus;
use crate::tools::{Tool, optional_str, required_str};

pub const NAME: &str = "todo";
pub const DESCRIPTION: &str = "Manage the plan: add an item, mark an item done, or list all items.";

#[derive(Debug, Clone, Copy, Default)]
pub struct TodoTool;

impl Tool for TodoTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {"type": "string", "enum": ["add", "done", "list"]},
                "text": {"type": "string"},
                "id": {"type": "string"},
            },
            "required": ["op"],
        })
    }

    fn invoke(&self, args: &Value, state: &mut ConversationState) -> Result<Value> {
        match required_str(args, "op")? {
            "add" => {
                let text = optional_str(args, "text").map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    bail!("todo add requires non-empty text");
                }
                let item = state.plan.add(text);
                Ok(json!({"ok": true, "item": item}))
            }
            "done" => {
                let id = required_str(args, "id")?;
                if state.plan.mark(id, PlanStatus::Done) {
                    Ok(json!({"ok": true}))
                } else {
                    Ok(json!({"ok": false, "error": format!("plan item not found: {id}")}))
                }
            }
            "list" => Ok(json!({"ok": true, "plan": state.plan.items()})),
            other => bail!("unsupported todo op: {other}"),
        }
    }
}
