//! Provider abstraction for model text generation.
//!
//! The [`Provider`] trait decouples the agent loop from any concrete model
//! backend. [`DummyProvider`] gives deterministic offline output,
//! [`CommandProvider`] delegates to an external program, and tests use
//! scripted providers that replay queued responses.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ChatMessage, Role};
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command_with_timeout};

/// Abstraction over model backends.
///
/// Failures are returned as errors and are not caught by the agent loop.
pub trait Provider {
    fn generate(&self, messages: &[ChatMessage], json_only: bool) -> Result<String>;
}

impl<P: Provider + ?Sized> Provider for &P {
    fn generate(&self, messages: &[ChatMessage], json_only: bool) -> Result<String> {
        (**self).generate(messages, json_only)
    }
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn generate(&self, messages: &[ChatMessage], json_only: bool) -> Result<String> {
        (**self).generate(messages, json_only)
    }
}

const DUMMY_SNIPPET_CHARS: usize = 200;

/// Offline provider with naive heuristics.
///
/// Echoes the last user message. In JSON mode, a request that mentions a spec
/// or JSON yields an agent spec object; anything else yields a short
/// `{thought, plan, final}` response.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyProvider;

impl Provider for DummyProvider {
    fn generate(&self, messages: &[ChatMessage], json_only: bool) -> Result<String> {
        let text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if !json_only {
            return Ok(text.to_string());
        }
        let snippet: String = text.chars().take(DUMMY_SNIPPET_CHARS).collect();
        let lowered = text.to_lowercase();
        let obj = if lowered.contains("spec") || lowered.contains("json") {
            json!({
                "name": "auto_agent",
                "description": snippet,
                "tools": ["todo", "fs"],
            })
        } else {
            json!({
                "thought": "Work out the goal, then add todos or read and write files.",
                "plan": ["Clarify the goal", "Call tools if needed", "Report the result"],
                "final": snippet,
            })
        };
        Ok(obj.to_string())
    }
}

/// Provider replaying a fixed list of responses, in order.
///
/// Errors once the list is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// Load responses from a file: a JSON array of strings/objects, or one
    /// response per non-empty line.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read script {}", path.display()))?;
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&contents) {
            let responses = items.into_iter().map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return Ok(Self::new(responses));
        }
        Ok(Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        ))
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

impl Provider for ScriptedProvider {
    fn generate(&self, _messages: &[ChatMessage], _json_only: bool) -> Result<String> {
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| anyhow!("scripted provider lock poisoned"))?;
        queue
            .pop_front()
            .ok_or_else(|| anyhow!("scripted provider has no responses left"))
    }
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    messages: &'a [ChatMessage],
    json_only: bool,
}

/// Provider that spawns an external command per generation.
///
/// The command receives `{"messages": [...], "json_only": bool}` on stdin and
/// must print the model text on stdout.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("provider command must be a non-empty array");
        }
        Ok(Self { argv, timeout })
    }
}

impl Provider for CommandProvider {
    #[instrument(skip_all, fields(program = %self.argv[0], messages = messages.len()))]
    fn generate(&self, messages: &[ChatMessage], json_only: bool) -> Result<String> {
        let request = serde_json::to_vec(&CommandRequest {
            messages,
            json_only,
        })
        .context("serialize provider request")?;

        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);
        info!("invoking provider command");
        let output = run_command_with_timeout(
            cmd,
            Some(&request),
            self.timeout,
            DEFAULT_OUTPUT_LIMIT_BYTES,
        )
        .context("run provider command")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "provider command timed out");
            bail!("provider command timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "provider command failed");
            bail!(
                "provider command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            );
        }
        let text = output.stdout_text();
        debug!(chars = text.len(), "provider command completed");
        Ok(text)
    }
}
