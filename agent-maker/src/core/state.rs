//! Conversation state owned by a single agent.
//!
//! Messages, plan items and trace events are append-only. Plan items may change
//! status but are never removed. Trace events are exposed read-only so that
//! redaction always works on copies.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::plan_item_id;
use crate::core::types::{
    ChatMessage, Message, PlanItem, PlanStatus, Role, TraceEvent, TraceKind,
};

/// Ordered to-do plan. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    items: Vec<PlanItem>,
}

impl Plan {
    /// Append a pending item with a fresh random id.
    pub fn add(&mut self, text: impl Into<String>) -> &PlanItem {
        self.add_with_id(plan_item_id(), text)
    }

    /// Append a pending item with a caller-chosen id.
    pub fn add_with_id(&mut self, id: impl Into<String>, text: impl Into<String>) -> &PlanItem {
        self.items.push(PlanItem {
            id: id.into(),
            text: text.into(),
            status: PlanStatus::Pending,
        });
        &self.items[self.items.len() - 1]
    }

    /// Set the status of the item with `id`. Returns `false` if no item matches.
    pub fn mark(&mut self, id: &str, status: PlanStatus) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&PlanItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items(&self) -> &[PlanItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Aggregate root for one agent's conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    pub plan: Plan,
    scratchpad: BTreeMap<String, Value>,
    trace: Vec<TraceEvent>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>, name: Option<&str>) {
        self.messages.push(Message {
            role,
            content: content.into(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
        });
    }

    pub fn add_trace(&mut self, kind: TraceKind, data: Value) {
        self.trace.push(TraceEvent::new(kind, data));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// History as replayed to the provider, oldest first.
    pub fn to_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(ChatMessage::from).collect()
    }

    pub fn scratchpad(&self, key: &str) -> Option<&Value> {
        self.scratchpad.get(key)
    }

    pub fn set_scratchpad(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.scratchpad.insert(key.into(), value)
    }
}
