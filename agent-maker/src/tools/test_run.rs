//! `test.run`: run the project's tests and summarize the outcome.
//!
//! Without a custom `cmd`, the configured chain is tried in order. Entries
//! whose program is not on `PATH` are skipped (the last entry is always
//! attempted), and the chain only advances when a command could not be
//! started. Test failures end the chain.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::core::state::ConversationState;
use crate::io::process::{
    DEFAULT_OUTPUT_LIMIT_BYTES, SpawnFailed, find_program, run_command_with_timeout,
    split_command, tail_chars,
};
use crate::io::workspace::Workspace;
use crate::tools::{Tool, optional_str};

pub const NAME: &str = "test.run";
pub const DESCRIPTION: &str =
    "Run the test suite (custom cmd or the default pytest chain) with a timeout and summarize results.";

const STDOUT_TAIL_CHARS: usize = 12_000;
const STDERR_TAIL_CHARS: usize = 4000;
const MAX_FAILURES: usize = 20;
const MAX_FAILURE_CHARS: usize = 500;

/// Patterns used to read counts out of pytest and cargo test output.
#[derive(Debug, Clone)]
struct SummaryPatterns {
    passed: Regex,
    passed_time: Regex,
    failed: Regex,
    skipped: Regex,
    ignored: Regex,
    cargo_failed_test: Regex,
}

impl SummaryPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            passed: Regex::new(r"(\d+)\s+passed")?,
            passed_time: Regex::new(r"(\d+)\s+passed.*?in\s+([0-9.]+)s")?,
            failed: Regex::new(r"(\d+)\s+failed")?,
            skipped: Regex::new(r"(\d+)\s+skipped")?,
            ignored: Regex::new(r"(\d+)\s+ignored")?,
            cargo_failed_test: Regex::new(r"^test\s+(\S+)\s+\.\.\.\s+FAILED")?,
        })
    }

    fn first_count(re: &Regex, text: &str) -> Option<u64> {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn summed_count(re: &Regex, lines: &[&str]) -> Option<u64> {
        let counts: Vec<u64> = lines
            .iter()
            .filter_map(|line| Self::first_count(re, line))
            .collect();
        (!counts.is_empty()).then(|| counts.iter().sum())
    }

    /// Extract `passed`, `failed`, `skipped`, `time_s` and `failures`.
    ///
    /// Cargo prints one `test result:` line per test binary; those are summed.
    /// Otherwise the first pytest-style summary wins.
    fn parse(&self, stdout: &str, stderr: &str) -> Map<String, Value> {
        let text = format!("{stdout}\n{stderr}");
        let mut summary = Map::new();

        let cargo_lines: Vec<&str> = text
            .lines()
            .filter(|line| line.trim_start().starts_with("test result:"))
            .collect();
        if cargo_lines.is_empty() {
            if let Some(caps) = self.passed_time.captures(&text) {
                if let Ok(time) = caps[2].parse::<f64>() {
                    summary.insert("time_s".to_string(), json!(time));
                }
            }
            let counts = [
                ("passed", Self::first_count(&self.passed, &text)),
                ("failed", Self::first_count(&self.failed, &text)),
                ("skipped", Self::first_count(&self.skipped, &text)),
            ];
            for (key, count) in counts {
                if let Some(n) = count {
                    summary.insert(key.to_string(), json!(n));
                }
            }
        } else {
            let times: Vec<f64> = cargo_lines
                .iter()
                .filter_map(|line| self.passed_time.captures(line))
                .filter_map(|caps| caps[2].parse::<f64>().ok())
                .collect();
            if !times.is_empty() {
                summary.insert("time_s".to_string(), json!(times.iter().sum::<f64>()));
            }
            let skipped = match (
                Self::summed_count(&self.skipped, &cargo_lines),
                Self::summed_count(&self.ignored, &cargo_lines),
            ) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            };
            let counts = [
                ("passed", Self::summed_count(&self.passed, &cargo_lines)),
                ("failed", Self::summed_count(&self.failed, &cargo_lines)),
                ("skipped", skipped),
            ];
            for (key, count) in counts {
                if let Some(n) = count {
                    summary.insert(key.to_string(), json!(n));
                }
            }
        }

        let failures: Vec<Value> = text
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("FAILED ") || self.cargo_failed_test.is_match(line))
            .take(MAX_FAILURES)
            .map(|line| json!({"entry": line.chars().take(MAX_FAILURE_CHARS).collect::<String>()}))
            .collect();
        if !failures.is_empty() {
            summary.insert("failures".to_string(), Value::Array(failures));
        }
        summary
    }
}

#[derive(Debug, Clone)]
pub struct TestRunTool {
    workspace: Workspace,
    commands: Vec<String>,
    default_timeout: Duration,
    patterns: SummaryPatterns,
}

impl TestRunTool {
    pub fn new(workspace: Workspace, commands: Vec<String>, default_timeout: Duration) -> Result<Self> {
        Ok(Self {
            workspace,
            commands,
            default_timeout,
            patterns: SummaryPatterns::new().context("compile test summary patterns")?,
        })
    }

    /// Default chain, skipping programs that are not installed.
    fn default_chain(&self) -> Vec<String> {
        let last = self.commands.len().saturating_sub(1);
        self.commands
            .iter()
            .enumerate()
            .filter(|(idx, command)| {
                *idx == last
                    || command
                        .split_whitespace()
                        .next()
                        .is_some_and(|program| find_program(program).is_some())
            })
            .map(|(_, command)| command.clone())
            .collect()
    }
}

impl Tool for TestRunTool {
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
                "cmd": {"type": "string"},
                "timeout": {"type": "integer", "minimum": 1},
            },
        })
    }

    fn invoke(&self, args: &Value, _state: &mut ConversationState) -> Result<Value> {
        let custom = optional_str(args, "cmd")
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty());
        let timeout = args
            .get("timeout")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let chain = match custom {
            Some(cmd) => vec![cmd.to_string()],
            None => self.default_chain(),
        };
        if chain.is_empty() {
            bail!("no test command configured");
        }

        let mut tried = Vec::new();
        for command in &chain {
            let argv = split_command(command)?;
            let (program, rest) = argv
                .split_first()
                .ok_or_else(|| anyhow!("empty test command"))?;
            let mut cmd = Command::new(program);
            cmd.args(rest).current_dir(self.workspace.root());
            info!(cmd = %command, timeout_secs = timeout.as_secs(), "running tests");

            let output = match run_command_with_timeout(cmd, None, timeout, DEFAULT_OUTPUT_LIMIT_BYTES)
            {
                Ok(output) => output,
                Err(err) if err.downcast_ref::<SpawnFailed>().is_some() => {
                    warn!(cmd = %command, err = %err, "test command could not start");
                    tried.push(json!({
                        "cmd": command,
                        "ok": false,
                        "code": null,
                        "error": err.to_string(),
                    }));
                    if custom.is_some() {
                        break;
                    }
                    continue;
                }
                Err(err) => return Err(err.context(format!("run {command}"))),
            };

            let ok = output.success();
            let code = output.code();
            let stdout = tail_chars(&output.stdout_text(), STDOUT_TAIL_CHARS);
            let stderr = tail_chars(&output.stderr_text(), STDERR_TAIL_CHARS);
            let summary = self.patterns.parse(&stdout, &stderr);
            debug!(cmd = %command, ok, ?code, timed_out = output.timed_out, "tests finished");

            let mut result = json!({
                "ok": ok,
                "cmd": command,
                "code": code,
                "timed_out": output.timed_out,
                "summary": summary,
                "stdout": stdout,
                "stderr": stderr,
            });
            if !ok {
                tried.push(json!({"cmd": command, "ok": false, "code": code}));
                result["tried"] = Value::Array(tried);
            }
            return Ok(result);
        }

        Ok(json!({
            "ok": false,
            "error": "no test command could be started",
            "summary": {},
            "tried": tried,
        }))
    }
}
