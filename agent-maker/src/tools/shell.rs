//! `shell`: run an allow-listed program in the workspace.
//!
//! The command line is split into argv and executed directly, so shell
//! operators (`;`, `&&`, `|`) are plain arguments and cannot chain a second
//! program past the allow-list.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::state::ConversationState;
use crate::io::process::{
    DEFAULT_OUTPUT_LIMIT_BYTES, run_command_with_timeout, split_command, tail_chars,
};
use crate::io::workspace::Workspace;
use crate::tools::{Tool, failure, required_str};

pub const NAME: &str = "shell";
pub const DESCRIPTION: &str = "Run an allow-listed command in the workspace (default: echo, ls).";

pub const STDOUT_TAIL_CHARS: usize = 8000;
pub const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct ShellTool {
    workspace: Workspace,
    allow: Vec<String>,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(workspace: Workspace, allow: Vec<String>, timeout: Duration) -> Self {
        Self {
            workspace,
            allow,
            timeout,
        }
    }
}

impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"cmd": {"type": "string"}},
            "required": ["cmd"],
        })
    }

    fn invoke(&self, args: &Value, _state: &mut ConversationState) -> Result<Value> {
        let line = required_str(args, "cmd")?.trim();
        let argv = split_command(line)?;
        let Some((program, rest)) = argv.split_first() else {
            return Ok(failure("shell requires a non-empty cmd"));
        };
        if !self.allow.iter().any(|allowed| allowed == program) {
            warn!(program = %program, "command not in allow-list");
            return Ok(failure(format!("command not allowed: {program}")));
        }

        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(self.workspace.root());
        let output = run_command_with_timeout(cmd, None, self.timeout, DEFAULT_OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run {program}"))?;

        let stdout = tail_chars(&output.stdout_text(), STDOUT_TAIL_CHARS);
        let stderr = tail_chars(&output.stderr_text(), STDERR_TAIL_CHARS);
        if output.timed_out {
            return Ok(json!({
                "ok": false,
                "error": format!("command timed out after {:?}", self.timeout),
                "code": null,
                "stdout": stdout,
                "stderr": stderr,
                "timed_out": true,
            }));
        }
        let code = output.code();
        debug!(program = %program, ?code, "shell command finished");
        Ok(json!({
            "ok": code == Some(0),
            "code": code,
            "stdout": stdout,
            "stderr": stderr,
            "timed_out": false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(allow: &[&str]) -> (tempfile::TempDir, ShellTool) {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::open(temp.path()).expect("workspace");
        let tool = ShellTool::new(
            ws,
            allow.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(5),
        );
        (temp, tool)
    }

    #[test]
    fn disallowed_program_is_rejected() {
        let (_temp, tool) = shell(&["echo"]);
        let result = tool
            .invoke(&json!({"cmd": "rm -rf /"}), &mut ConversationState::new())
            .expect("invoke");
        assert_eq!(result["ok"], false);
        assert_eq!(result["error"], "command not allowed: rm");
    }

    #[test]
    fn empty_command_is_rejected() {
        let (_temp, tool) = shell(&["echo"]);
        let result = tool
            .invoke(&json!({"cmd": "   "}), &mut ConversationState::new())
            .expect("invoke");
        assert_eq!(result["ok"], false);
    }

    #[cfg(unix)]
    #[test]
    fn operators_are_passed_as_arguments() {
        let (_temp, tool) = shell(&["echo"]);
        let result = tool
            .invoke(&json!({"cmd": "echo hi; rm x"}), &mut ConversationState::new())
            .expect("invoke");
        assert_eq!(result["ok"], true);
        assert_eq!(result["code"], 0);
        assert_eq!(result["stdout"], "hi; rm x\n");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_reported_not_raised() {
        let (_temp, tool) = shell(&["ls"]);
        let result = tool
            .invoke(&json!({"cmd": "ls does-not-exist"}), &mut ConversationState::new())
            .expect("invoke");
        assert_eq!(result["ok"], false);
        assert_ne!(result["code"], 0);
        assert!(!result["stderr"].as_str().unwrap_or_default().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn runs_in_workspace_root() {
        let (temp, tool) = shell(&["ls"]);
        std::fs::write(temp.path().join("marker.txt"), "x").expect("write");
        let result = tool
            .invoke(&json!({"cmd": "ls"}), &mut ConversationState::new())
            .expect("invoke");
        assert!(result["stdout"].as_str().unwrap_or_default().contains("marker.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_a_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = ShellTool::new(
            Workspace::open(temp.path()).expect("workspace"),
            vec!["sleep".to_string()],
            Duration::from_millis(200),
        );
        let result = tool
            .invoke(&json!({"cmd": "sleep 5"}), &mut ConversationState::new())
            .expect("invoke");
        assert_eq!(result["ok"], false);
        assert_eq!(result["timed_out"], true);
    }
}
