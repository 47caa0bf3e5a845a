//! Name-keyed tool registry with argument validation.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use jsonschema::Validator;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::core::state::ConversationState;
use crate::io::config::ToolSettings;
use crate::io::workspace::Workspace;
use crate::tools::fs::{FsReadTool, FsWriteTool};
use crate::tools::patch::FsPatchTool;
use crate::tools::search::CodeSearchTool;
use crate::tools::shell::ShellTool;
use crate::tools::test_run::TestRunTool;
use crate::tools::todo::TodoTool;
use crate::tools::{BuiltinTool, Tool, failure, fs, patch, search, shell, test_run, todo};

/// Name expanding to `fs.read` + `fs.write`.
pub const FS_ALIAS: &str = "fs";

struct RegisteredTool {
    tool: BuiltinTool,
    validator: Validator,
}

/// Tools available to one agent, built once from a list of names.
///
/// Order follows the request, with duplicates dropped.
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
    index: HashMap<&'static str, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Expand aliases and drop repeats, keeping first-seen order.
pub fn expand_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<&'static str>> {
    let mut expanded: Vec<&'static str> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        let canonical: &[&'static str] = match name {
            FS_ALIAS => &[fs::READ_NAME, fs::WRITE_NAME],
            todo::NAME => &[todo::NAME],
            fs::READ_NAME => &[fs::READ_NAME],
            fs::WRITE_NAME => &[fs::WRITE_NAME],
            shell::NAME => &[shell::NAME],
            search::NAME => &[search::NAME],
            patch::NAME => &[patch::NAME],
            test_run::NAME => &[test_run::NAME],
            other => bail!("unknown tool: {other}"),
        };
        for tool in canonical {
            if !expanded.contains(tool) {
                expanded.push(tool);
            }
        }
    }
    Ok(expanded)
}

impl ToolRegistry {
    /// Build tools from names. Unknown names fail immediately.
    ///
    /// The workspace root is opened only when a path-based tool is requested.
    #[instrument(skip_all, fields(requested = names.len()))]
    pub fn from_names<S: AsRef<str>>(names: &[S], settings: &ToolSettings) -> Result<Self> {
        let expanded = expand_names(names)?;
        let mut workspace: Option<Workspace> = None;
        let mut registry = Self {
            entries: Vec::with_capacity(expanded.len()),
            index: HashMap::new(),
        };
        for name in expanded {
            let tool = build_tool(name, settings, &mut workspace)?;
            registry.insert(tool)?;
        }
        debug!(tools = ?registry.names(), "tool registry built");
        Ok(registry)
    }

    fn insert(&mut self, tool: BuiltinTool) -> Result<()> {
        let name = tool.name();
        if self.index.contains_key(name) {
            return Ok(());
        }
        let schema = tool.schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|err| anyhow!("invalid schema for {name}: {err}"))?;
        self.index.insert(name, self.entries.len());
        self.entries.push(RegisteredTool { tool, validator });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinTool> {
        self.index.get(name).map(|idx| &self.entries[*idx].tool)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.tool.name()).collect()
    }

    pub fn tools(&self) -> impl Iterator<Item = &BuiltinTool> {
        self.entries.iter().map(|entry| &entry.tool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke a tool by name. Always returns a result object.
    ///
    /// Unknown names, schema violations and handler errors all become
    /// `{ok: false, error}`. No retries.
    #[instrument(skip_all, fields(tool = name))]
    pub fn dispatch(&self, name: &str, args: &Value, state: &mut ConversationState) -> Value {
        let Some(entry) = self.index.get(name).map(|idx| &self.entries[*idx]) else {
            warn!("tool not found");
            return failure(format!("tool not found: {name}"));
        };
        let empty = json!({});
        let args = if args.is_null() { &empty } else { args };
        if !entry.validator.is_valid(args) {
            let messages = entry
                .validator
                .iter_errors(args)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            warn!(errors = messages.len(), "tool args failed validation");
            return failure(format!("invalid args for {name}: {}", messages.join("; ")));
        }
        match entry.tool.invoke(args, state) {
            Ok(result) => {
                debug!(ok = ?result.get("ok"), "tool finished");
                result
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "tool failed");
                failure(format!("{err:#}"))
            }
        }
    }
}

fn workspace_for<'a>(
    cache: &'a mut Option<Workspace>,
    settings: &ToolSettings,
) -> Result<&'a Workspace> {
    if cache.is_none() {
        *cache = Some(Workspace::open(&settings.workspace)?);
    }
    cache
        .as_ref()
        .ok_or_else(|| anyhow!("workspace not initialised"))
}

fn build_tool(
    name: &'static str,
    settings: &ToolSettings,
    workspace: &mut Option<Workspace>,
) -> Result<BuiltinTool> {
    let tool = match name {
        todo::NAME => BuiltinTool::Todo(TodoTool),
        fs::READ_NAME => BuiltinTool::FsRead(FsReadTool::new(workspace_for(workspace, settings)?.clone())),
        fs::WRITE_NAME => {
            BuiltinTool::FsWrite(FsWriteTool::new(workspace_for(workspace, settings)?.clone()))
        }
        shell::NAME => BuiltinTool::Shell(ShellTool::new(
            workspace_for(workspace, settings)?.clone(),
            settings.shell_allow.clone(),
            settings.shell_timeout(),
        )),
        search::NAME => BuiltinTool::CodeSearch(CodeSearchTool::new(
            workspace_for(workspace, settings)?.clone(),
            settings.search_prefer_ripgrep,
            settings.search_max_files,
        )),
        patch::NAME => BuiltinTool::FsPatch(FsPatchTool::new(
            workspace_for(workspace, settings)?.clone(),
            settings.patch_timeout(),
        )),
        test_run::NAME => BuiltinTool::TestRun(TestRunTool::new(
            workspace_for(workspace, settings)?.clone(),
            settings.test_commands.clone(),
            settings.test_timeout(),
        )?),
        other => bail!("unknown tool: {other}"),
    };
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(root: &std::path::Path) -> ToolSettings {
        ToolSettings {
            workspace: root.to_path_buf(),
            ..ToolSettings::default()
        }
    }

    #[test]
    fn fs_alias_expands_and_dedupes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry =
            ToolRegistry::from_names(&["fs", "fs.read", "todo", "fs"], &settings(temp.path()))
                .expect("registry");
        assert_eq!(registry.names(), vec!["fs.read", "fs.write", "todo"]);
    }

    #[test]
    fn unknown_name_fails_construction() {
        let err = ToolRegistry::from_names(&["todo", "teleport"], &ToolSettings::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: teleport");
    }

    #[test]
    fn todo_only_registry_does_not_need_a_workspace() {
        let settings = ToolSettings {
            workspace: "/definitely/not/here".into(),
            ..ToolSettings::default()
        };
        assert!(ToolRegistry::from_names(&["todo"], &settings).is_ok());
        assert!(ToolRegistry::from_names(&["fs.read"], &settings).is_err());
    }

    #[test]
    fn every_builtin_schema_compiles() {
        let temp = tempfile::tempdir().expect("tempdir");
        let names: Vec<&str> = crate::tools::list_builtin_tools()
            .iter()
            .map(|info| info.name)
            .collect();
        let registry = ToolRegistry::from_names(&names, &settings(temp.path())).expect("registry");
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn dispatch_unknown_tool_is_a_result() {
        let registry = ToolRegistry::from_names(&["todo"], &ToolSettings::default()).expect("registry");
        let mut state = ConversationState::new();
        let result = registry.dispatch("nope", &json!({}), &mut state);
        assert_eq!(result, json!({"ok": false, "error": "tool not found: nope"}));
    }

    #[test]
    fn dispatch_validates_args_before_invoking() {
        let registry = ToolRegistry::from_names(&["todo"], &ToolSettings::default()).expect("registry");
        let mut state = ConversationState::new();
        let result = registry.dispatch("todo", &json!({"op": "explode"}), &mut state);
        assert_eq!(result["ok"], false);
        assert!(
            result["error"]
                .as_str()
                .unwrap_or_default()
                .starts_with("invalid args for todo:")
        );

        let result = registry.dispatch("todo", &Value::Null, &mut state);
        assert_eq!(result["ok"], false);
        assert!(state.plan.is_empty());
    }

    #[test]
    fn dispatch_converts_handler_errors() {
        let registry = ToolRegistry::from_names(&["todo"], &ToolSettings::default()).expect("registry");
        let mut state = ConversationState::new();
        let result = registry.dispatch("todo", &json!({"op": "add", "text": ""}), &mut state);
        assert_eq!(
            result,
            json!({"ok": false, "error": "todo add requires non-empty text"})
        );
    }
}
