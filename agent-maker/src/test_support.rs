//! Test-only helpers for building workspaces, configs and scripted agents.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use crate::agent::Agent;
use crate::io::config::{RuntimeConfig, ToolSettings};
use crate::io::provider::ScriptedProvider;
use crate::tools::ToolRegistry;

/// Temp directory holding a tool workspace and a run directory.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("workspace")).expect("create workspace");
        Self { temp }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn workspace(&self) -> PathBuf {
        self.temp.path().join("workspace")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.temp.path().join("runs")
    }

    /// Write `contents` to `rel` inside the workspace, creating parents.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.workspace().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write file");
        path
    }

    pub fn settings(&self) -> ToolSettings {
        ToolSettings {
            workspace: self.workspace(),
            ..ToolSettings::default()
        }
    }

    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig {
            run_dir: self.run_dir(),
            tools: self.settings(),
            ..RuntimeConfig::default()
        }
    }

    pub fn registry(&self, names: &[&str]) -> ToolRegistry {
        ToolRegistry::from_names(names, &self.settings()).expect("registry")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Agent replaying `responses` (JSON values rendered as text) with `tools`.
pub fn scripted_agent(
    ws: &TestWorkspace,
    tools: &[&str],
    responses: &[Value],
) -> Agent<ScriptedProvider> {
    let provider = ScriptedProvider::new(responses.iter().map(Value::to_string));
    Agent::new("scripted", "You are a test agent.", ws.registry(tools), provider)
}
