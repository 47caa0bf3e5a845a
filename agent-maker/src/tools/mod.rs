//! Built-in tools callable by the agent.
//!
//! Every tool implements [`Tool`]. The set is closed: [`BuiltinTool`] has one
//! variant per tool and the [`registry`] maps names to constructed variants.
//! Handlers return `Err` for faults; the registry turns those into
//! `{ok: false, error}` results so the loop never sees them.

use std::fmt::Display;

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::state::ConversationState;

pub mod fs;
pub mod registry;
pub mod search;
pub mod patch;
pub mod shell;
pub mod test_run;
pub mod todo;

pub use registry::ToolRegistry;

/// Capability shared by all tools.
pub trait Tool {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema for `args`.
    fn schema(&self) -> Value;
    fn invoke(&self, args: &Value, state: &mut ConversationState) -> Result<Value>;
}

/// One constructed built-in tool.
#[derive(Debug, Clone)]
pub enum BuiltinTool {
    Todo(todo::TodoTool),
    FsRead(fs::FsReadTool),
    FsWrite(fs::FsWriteTool),
    Shell(shell::ShellTool),
    CodeSearch(search::CodeSearchTool),
    FsPatch(patch::FsPatchTool),
    TestRun(test_run::TestRunTool),
}

impl BuiltinTool {
    fn inner(&self) -> &dyn Tool {
        match self {
            BuiltinTool::Todo(tool) => tool,
            BuiltinTool::FsRead(tool) => tool,
            BuiltinTool::FsWrite(tool) => tool,
            BuiltinTool::Shell(tool) => tool,
            BuiltinTool::CodeSearch(tool) => tool,
            BuiltinTool::FsPatch(tool) => tool,
            BuiltinTool::TestRun(tool) => tool,
        }
    }
}

impl Tool for BuiltinTool {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn description(&self) -> &'static str {
        self.inner().description()
    }

    fn schema(&self) -> Value {
        self.inner().schema()
    }

    fn invoke(&self, args: &Value, state: &mut ConversationState) -> Result<Value> {
        self.inner().invoke(args, state)
    }
}

/// Name and description of a built-in tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuiltinToolInfo {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn list_builtin_tools() -> Vec<BuiltinToolInfo> {
    [
        (todo::NAME, todo::DESCRIPTION),
        (fs::READ_NAME, fs::READ_DESCRIPTION),
        (fs::WRITE_NAME, fs::WRITE_DESCRIPTION),
        (shell::NAME, shell::DESCRIPTION),
        (search::NAME, search::DESCRIPTION),
        (patch::NAME, patch::DESCRIPTION),
        (test_run::NAME, test_run::DESCRIPTION),
    ]
    .into_iter()
    .map(|(name, description)| BuiltinToolInfo { name, description })
    .collect()
}

/// Structured failure result.
pub fn failure(message: impl Display) -> Value {
    json!({"ok": false, "error": message.to_string()})
}

/// Required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => bail!("argument '{key}' must be a string"),
        None => bail!("missing argument '{key}'"),
    }
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn flag(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_seven_builtins_in_order() {
        let names: Vec<_> = list_builtin_tools().iter().map(|info| info.name).collect();
        assert_eq!(
            names,
            vec![
                "todo",
                "fs.read",
                "fs.write",
                "shell",
                "code.search",
                "fs.patch",
                "test.run"
            ]
        );
    }

    #[test]
    fn failure_has_ok_false() {
        assert_eq!(failure("nope"), json!({"ok": false, "error": "nope"}));
    }

    #[test]
    fn required_str_reports_missing_and_wrong_type() {
        let args = json!({"path": 3});
        assert!(required_str(&args, "path").unwrap_err().to_string().contains("must be a string"));
        assert!(required_str(&args, "other").unwrap_err().to_string().contains("missing"));
    }
}
