//! AgentSpec load/save helpers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::core::spec::AgentSpec;

/// Load an AgentSpec from a JSON file. The root must be an object.
pub fn load_spec(path: &Path) -> Result<AgentSpec> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read spec {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse spec {}", path.display()))?;
    AgentSpec::from_value(&value).with_context(|| format!("load spec {}", path.display()))
}

/// Write an AgentSpec as pretty JSON, creating parent directories.
pub fn write_spec(path: &Path, spec: &AgentSpec) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(&spec.to_value())?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write spec {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("specs").join("agent.json");
        let spec = AgentSpec {
            name: "helper".to_string(),
            description: "d".to_string(),
            tools: vec!["todo".to_string()],
        };
        write_spec(&path, &spec).expect("write");
        assert_eq!(load_spec(&path).expect("load"), spec);
    }

    #[test]
    fn array_root_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.json");
        fs::write(&path, "[]").expect("write");
        let err = load_spec(&path).unwrap_err();
        assert!(format!("{err:#}").contains("must be a JSON object"));
    }
}
