//! One agent and its decision step.
//!
//! A step appends the optional user input, replays `[system] + history` to the
//! provider, parses the reply into a [`Decision`], and applies exactly one
//! effect: a tool call, a final answer, or a continuation.

use anyhow::Result;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::core::decision::{Action, Decision, ToolCall};
use crate::core::spec::AgentSpec;
use crate::core::state::ConversationState;
use crate::core::types::{ChatMessage, Role, TraceKind};
use crate::io::config::ToolSettings;
use crate::io::prompt::render_system_prompt;
use crate::io::provider::Provider;
use crate::tools::ToolRegistry;

/// Where the agent is in its step cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    AwaitingInput,
    Generating,
    Parsed,
    ToolDispatch,
    Final,
    Continue,
}

/// Effect of one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A tool ran (or was reported missing); its result was appended to history.
    Tool { name: String, result: Value },
    /// The model produced a final answer.
    Final { output: String },
    /// Nothing terminal happened; `decision` is the parsed object.
    Continue { decision: Value },
}

impl StepOutcome {
    pub fn is_final(&self) -> bool {
        matches!(self, StepOutcome::Final { .. })
    }

    pub fn to_value(&self) -> Value {
        match self {
            StepOutcome::Tool { name, result } => {
                json!({"type": "tool", "name": name, "result": result})
            }
            StepOutcome::Final { output } => json!({"type": "final", "output": output}),
            StepOutcome::Continue { decision } => json!({"type": "continue", "obj": decision}),
        }
    }
}

pub struct Agent<P> {
    name: String,
    system_prompt: String,
    tools: ToolRegistry,
    provider: P,
    json_only: bool,
    state: ConversationState,
    phase: AgentPhase,
}

impl<P: Provider> Agent<P> {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: ToolRegistry,
        provider: P,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools,
            provider,
            json_only: true,
            state: ConversationState::new(),
            phase: AgentPhase::AwaitingInput,
        }
    }

    /// Build an agent from a spec, rendering the default system prompt.
    pub fn from_spec(spec: &AgentSpec, settings: &ToolSettings, provider: P) -> Result<Self> {
        let tools = ToolRegistry::from_names(&spec.tools, settings)?;
        let system_prompt = render_system_prompt(&spec.name, &spec.description, &tools)?;
        Ok(Self::new(spec.name.clone(), system_prompt, tools, provider))
    }

    /// With `false`, provider text is taken verbatim as the final answer.
    pub fn with_json_only(mut self, json_only: bool) -> Self {
        self.json_only = json_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ConversationState {
        &mut self.state
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// `[system] + full history`, no truncation.
    pub fn prompt_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.state.messages().len() + 1);
        messages.push(ChatMessage::new(Role::System, self.system_prompt.clone()));
        messages.extend(self.state.to_history());
        messages
    }

    fn transition(&mut self, next: AgentPhase) {
        debug!(from = ?self.phase, to = ?next, "agent phase");
        self.phase = next;
    }

    /// Run one decision step. Provider errors propagate; everything else is
    /// recovered and reported through the outcome.
    #[instrument(skip_all, fields(agent = %self.name, with_input = user_input.is_some()))]
    pub fn step(&mut self, user_input: Option<&str>) -> Result<StepOutcome> {
        if let Some(input) = user_input {
            self.state.add_message(Role::User, input, None);
        }
        let messages = self.prompt_messages();

        self.transition(AgentPhase::Generating);
        let raw = self.provider.generate(&messages, self.json_only)?;
        self.state
            .add_trace(TraceKind::ModelOutput, json!({"raw": raw}));

        let decision = Decision::parse(&raw, self.json_only);
        self.transition(AgentPhase::Parsed);

        let outcome = match decision.action() {
            Action::Tool(call) => self.dispatch(call),
            action => {
                if let Some(plan) = &decision.plan {
                    self.apply_plan(plan);
                }
                match action {
                    Action::Final(answer) => {
                        self.state.add_message(Role::Assistant, answer, None);
                        StepOutcome::Final {
                            output: answer.to_string(),
                        }
                    }
                    Action::Thought(thought) => {
                        self.state.add_message(Role::Assistant, thought, None);
                        StepOutcome::Continue {
                            decision: decision.raw.clone(),
                        }
                    }
                    Action::Tool(_) | Action::Inconclusive => StepOutcome::Continue {
                        decision: decision.raw.clone(),
                    },
                }
            }
        };

        let phase = match &outcome {
            StepOutcome::Tool { .. } => AgentPhase::ToolDispatch,
            StepOutcome::Final { .. } => AgentPhase::Final,
            StepOutcome::Continue { .. } => AgentPhase::Continue,
        };
        self.transition(phase);
        Ok(outcome)
    }

    fn dispatch(&mut self, call: &ToolCall) -> StepOutcome {
        let result = self.tools.dispatch(&call.name, &call.args, &mut self.state);
        self.state
            .add_message(Role::Tool, result.to_string(), Some(&call.name));
        self.state.add_trace(
            TraceKind::Tool,
            json!({"name": call.name, "args": call.args, "result": result}),
        );
        StepOutcome::Tool {
            name: call.name.clone(),
            result,
        }
    }

    fn apply_plan(&mut self, plan: &[String]) {
        for entry in plan {
            self.state.plan.add(entry.as_str());
        }
        self.state.add_trace(TraceKind::Plan, json!({"added": plan}));
        debug!(added = plan.len(), "plan updated");
    }
}
