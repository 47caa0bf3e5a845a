//! Drives agent steps under a step budget and persists the redacted trace.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::agent::{Agent, StepOutcome};
use crate::core::ids;
use crate::core::redact::Redactor;
use crate::core::types::{Role, TraceEvent, TraceKind};
use crate::io::config::RuntimeConfig;
use crate::io::provider::Provider;
use crate::io::trace_store::write_trace;

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStop {
    Final,
    /// The budget ran out before a final answer. `last` is the outcome of the
    /// last step taken, if any.
    BudgetExhausted { last: Option<StepOutcome> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run_id: String,
    /// Final answer, or the empty string when the budget ran out.
    pub output: String,
    pub steps: u32,
    pub stop: RunStop,
    /// Where the trace was written, when tracing is enabled.
    pub trace_path: Option<PathBuf>,
}

impl RunResult {
    pub fn is_final(&self) -> bool {
        self.stop == RunStop::Final
    }
}

#[derive(Debug, Clone)]
pub struct Runner {
    max_steps: u32,
    run_dir: PathBuf,
    tracing_enabled: bool,
    redactor: Redactor,
}

impl Runner {
    pub fn new(max_steps: u32, run_dir: impl Into<PathBuf>, tracing_enabled: bool, redactor: Redactor) -> Self {
        Self {
            max_steps,
            run_dir: run_dir.into(),
            tracing_enabled,
            redactor,
        }
    }

    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self::new(
            cfg.max_steps,
            cfg.run_dir.clone(),
            cfg.tracing_enabled,
            cfg.redactor(),
        )
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Run `task` to a final answer or until the budget is spent.
    ///
    /// The trace is persisted after the loop, also when a provider error ends
    /// the run early; that error is then returned.
    #[instrument(skip_all, fields(max_steps = self.max_steps))]
    pub fn run<P: Provider>(&self, agent: &mut Agent<P>, task: &str) -> Result<RunResult> {
        let run_id = ids::run_id();
        let state = agent.state_mut();
        state.add_message(Role::User, task, None);
        state.add_trace(TraceKind::Start, json!({"task": task, "run_id": run_id}));
        info!(run_id = %run_id, agent = agent.name(), "run started");

        let driven = self.drive(agent);
        let persisted = self.persist(&run_id, agent.state().trace());

        let (steps, output, stop) = match driven {
            Ok(done) => done,
            Err(err) => {
                if let Err(persist_err) = &persisted {
                    warn!(err = %format!("{persist_err:#}"), "trace not persisted");
                }
                return Err(err);
            }
        };
        let trace_path = persisted?;
        if let RunStop::BudgetExhausted { .. } = stop {
            warn!(run_id = %run_id, steps, "step budget exhausted without a final answer");
        } else {
            info!(run_id = %run_id, steps, "run finished");
        }
        Ok(RunResult {
            run_id,
            output,
            steps,
            stop,
            trace_path,
        })
    }

    fn drive<P: Provider>(&self, agent: &mut Agent<P>) -> Result<(u32, String, RunStop)> {
        let mut last = None;
        for step in 0..self.max_steps {
            let outcome = agent
                .step(None)
                .with_context(|| format!("step {}", step + 1))?;
            if let StepOutcome::Final { output } = &outcome {
                return Ok((step + 1, output.clone(), RunStop::Final));
            }
            last = Some(outcome);
        }
        Ok((self.max_steps, String::new(), RunStop::BudgetExhausted { last }))
    }

    fn persist(&self, run_id: &str, events: &[TraceEvent]) -> Result<Option<PathBuf>> {
        if !self.tracing_enabled {
            return Ok(None);
        }
        write_trace(&self.run_dir, run_id, events, &self.redactor)
            .with_context(|| format!("persist trace for {run_id}"))
            .map(Some)
    }
}
