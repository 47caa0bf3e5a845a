//! Orchestration for `agent-maker design`: ask a provider for an agent spec.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{Agent, StepOutcome};
use crate::core::spec::AgentSpec;
use crate::io::prompt::render_designer_prompt;
use crate::io::provider::Provider;
use crate::runner::{RunResult, RunStop, Runner};
use crate::tools::ToolRegistry;

pub const DESIGNER_NAME: &str = "AgentMakerDesigner";
pub const DEFAULT_FALLBACK_NAME: &str = "auto_agent";

/// Run a single designer step and read its reply as an [`AgentSpec`].
///
/// The reply may be a spec object or a final answer holding spec JSON.
/// Anything else yields `{name: fallback_name, description: prompt, tools:
/// ["todo", "fs"]}`.
pub fn design_spec<P: Provider>(
    runner: &Runner,
    provider: P,
    prompt: &str,
    fallback_name: &str,
) -> Result<(AgentSpec, RunResult)> {
    let registry = ToolRegistry::from_names::<&str>(&[], &Default::default())?;
    let mut agent = Agent::new(DESIGNER_NAME, render_designer_prompt()?, registry, provider);
    let result = runner.clone().with_max_steps(1).run(&mut agent, prompt)?;

    let spec = match spec_candidate(&result) {
        Some(value) => match AgentSpec::from_value(&value) {
            Ok(spec) => spec,
            Err(err) => {
                warn!(err = %err, "designer reply is not a spec, using fallback");
                fallback_spec(prompt, fallback_name)
            }
        },
        None => {
            debug!("designer reply has no spec object, using fallback");
            fallback_spec(prompt, fallback_name)
        }
    };
    Ok((spec, result))
}

fn spec_candidate(result: &RunResult) -> Option<Value> {
    match &result.stop {
        RunStop::Final => match serde_json::from_str::<Value>(&result.output) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        },
        RunStop::BudgetExhausted {
            last: Some(StepOutcome::Continue { decision }),
        } if decision.get("name").is_some() || decision.get("tools").is_some() => {
            Some(decision.clone())
        }
        RunStop::BudgetExhausted { .. } => None,
    }
}

pub fn fallback_spec(prompt: &str, fallback_name: &str) -> AgentSpec {
    let name = if fallback_name.trim().is_empty() {
        DEFAULT_FALLBACK_NAME
    } else {
        fallback_name
    };
    AgentSpec {
        name: name.to_string(),
        description: prompt.to_string(),
        tools: vec!["todo".to_string(), "fs".to_string()],
    }
}
