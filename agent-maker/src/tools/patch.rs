//! `fs.patch`: apply a unified diff inside the workspace with `patch`.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::state::ConversationState;
use crate::io::process::{
    DEFAULT_OUTPUT_LIMIT_BYTES, find_program, run_command_with_timeout, tail_chars,
};
use crate::io::workspace::Workspace;
use crate::tools::{Tool, failure, flag, required_str};

pub const NAME: &str = "fs.patch";
pub const DESCRIPTION: &str =
    "Apply a unified diff to workspace files (supports dry_run, strip and reverse).";

const STDOUT_TAIL_CHARS: usize = 8000;
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct FsPatchTool {
    workspace: Workspace,
    timeout: Duration,
}

impl FsPatchTool {
    pub fn new(workspace: Workspace, timeout: Duration) -> Self {
        Self { workspace, timeout }
    }

    /// Check every `---`/`+++` path before anything touches the filesystem.
    fn validate_paths(&self, patch: &str, strip: usize) -> Result<(), String> {
        for path in header_paths(patch) {
            if path.starts_with('/') {
                return Err(format!("absolute paths are not allowed: {path}"));
            }
            let stripped = strip_components(path, strip);
            for candidate in [Some(path), stripped].into_iter().flatten() {
                if self.workspace.resolve(candidate).is_err() {
                    return Err(format!("path escapes workspace: {path}"));
                }
            }
        }
        Ok(())
    }
}

/// File paths named in diff headers, without `a/`/`b/` prefixes or timestamps.
fn header_paths(patch: &str) -> Vec<&str> {
    patch
        .lines()
        .filter_map(|line| line.strip_prefix("+++").or_else(|| line.strip_prefix("---")))
        .filter_map(|rest| {
            let mut part = rest.trim();
            if part.starts_with("/dev/null") {
                return None;
            }
            if let Some(stripped) = part.strip_prefix("a/").or_else(|| part.strip_prefix("b/")) {
                part = stripped;
            }
            let part = part.split('\t').next().unwrap_or_default().trim();
            let part = part.split(' ').next().unwrap_or_default().trim();
            (!part.is_empty() && part != "/dev/null").then_some(part)
        })
        .collect()
}

/// Drop `strip` leading components, as `patch -p<strip>` does.
fn strip_components(path: &str, strip: usize) -> Option<&str> {
    if strip == 0 {
        return None;
    }
    path.splitn(strip + 1, '/').nth(strip)
}

impl Tool for FsPatchTool {
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
                "patch": {"type": "string"},
                "dry_run": {"type": "boolean"},
                "strip": {"type": "integer", "minimum": 0},
                "reverse": {"type": "boolean"},
            },
            "required": ["patch"],
        })
    }

    fn invoke(&self, args: &Value, _state: &mut ConversationState) -> Result<Value> {
        let patch = required_str(args, "patch")?;
        if patch.trim().is_empty() {
            return Ok(failure("fs.patch requires a non-empty patch"));
        }
        let dry_run = flag(args, "dry_run");
        let reverse = flag(args, "reverse");
        let strip = args.get("strip").and_then(Value::as_u64).unwrap_or(0) as usize;

        if let Err(reason) = self.validate_paths(patch, strip) {
            warn!(%reason, "patch rejected");
            return Ok(failure(reason));
        }
        if find_program("patch").is_none() {
            return Ok(failure("the 'patch' utility is not installed"));
        }

        let mut cmd = Command::new("patch");
        if reverse {
            cmd.arg("-R");
        }
        if dry_run {
            cmd.arg("--dry-run");
        }
        cmd.arg(format!("-p{strip}"))
            .args(["--posix", "--force", "--backup", "--reject-file=-"])
            .current_dir(self.workspace.root());
        let output = run_command_with_timeout(
            cmd,
            Some(patch.as_bytes()),
            self.timeout,
            DEFAULT_OUTPUT_LIMIT_BYTES,
        )
        .context("run patch")?;

        let code = output.code();
        debug!(?code, dry_run, reverse, "patch finished");
        let mut result = json!({
            "ok": output.success(),
            "code": code,
            "stdout": tail_chars(&output.stdout_text(), STDOUT_TAIL_CHARS),
            "stderr": tail_chars(&output.stderr_text(), STDERR_TAIL_CHARS),
            "dry_run": dry_run,
        });
        if output.timed_out {
            result["timed_out"] = json!(true);
            result["error"] = json!(format!("patch timed out after {:?}", self.timeout));
        }
        Ok(result)
    }
}
