//! Runtime configuration, usually stored as `agent-maker.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::redact::{Privacy, Redactor};

pub const ENV_PRIVACY: &str = "AGENT_MAKER_PRIVACY";
pub const ENV_TRACE_ENABLED: &str = "AGENT_MAKER_TRACE_ENABLED";
pub const ENV_REDACT_PLACEHOLDER: &str = "AGENT_MAKER_REDACT_PLACEHOLDER";
pub const ENV_MAX_VALUE_LEN: &str = "AGENT_MAKER_MAX_VALUE_LEN";

/// Runtime configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults
/// below. The struct is built once and passed by reference into the runner,
/// the redactor and the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub privacy: Privacy,

    /// Persist `runs/<run_id>/trace.jsonl` after each run.
    pub tracing_enabled: bool,

    pub redact_placeholder: String,

    /// Strings longer than this are truncated in persisted traces.
    pub max_value_length: usize,

    /// Directory holding per-run trace directories.
    pub run_dir: PathBuf,

    /// Default step budget for `agent-maker run`.
    pub max_steps: u32,

    pub tools: ToolSettings,
}

/// Knobs for the built-in tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolSettings {
    /// Root every path-based tool is confined to.
    pub workspace: PathBuf,

    /// Programs the `shell` tool may start.
    pub shell_allow: Vec<String>,
    pub shell_timeout_secs: u64,

    /// Use `rg` for `code.search` when it is on `PATH`.
    pub search_prefer_ripgrep: bool,
    /// Files visited by the fallback search walk before it stops.
    pub search_max_files: usize,

    pub patch_timeout_secs: u64,

    /// Default `test.run` chain, tried in order.
    pub test_commands: Vec<String>,
    pub test_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            shell_allow: vec!["echo".to_string(), "ls".to_string()],
            shell_timeout_secs: 10,
            search_prefer_ripgrep: true,
            search_max_files: 20_000,
            patch_timeout_secs: 15,
            test_commands: vec![
                "uv run -m pytest -q".to_string(),
                "pytest -q".to_string(),
                "python -m pytest -q".to_string(),
            ],
            test_timeout_secs: 60,
        }
    }
}

impl ToolSettings {
    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    pub fn patch_timeout(&self) -> Duration {
        Duration::from_secs(self.patch_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            privacy: Privacy::Standard,
            tracing_enabled: true,
            redact_placeholder: "***".to_string(),
            max_value_length: 2000,
            run_dir: PathBuf::from("runs"),
            max_steps: 6,
            tools: ToolSettings::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_value_length == 0 {
            return Err(anyhow!("max_value_length must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.run_dir.as_os_str().is_empty() {
            return Err(anyhow!("run_dir must not be empty"));
        }
        if self.tools.workspace.as_os_str().is_empty() {
            return Err(anyhow!("tools.workspace must not be empty"));
        }
        if self.tools.shell_timeout_secs == 0
            || self.tools.patch_timeout_secs == 0
            || self.tools.test_timeout_secs == 0
        {
            return Err(anyhow!("tool timeouts must be > 0"));
        }
        if self.tools.search_max_files == 0 {
            return Err(anyhow!("tools.search_max_files must be > 0"));
        }
        if self.tools.test_commands.iter().any(|c| c.trim().is_empty()) {
            return Err(anyhow!("tools.test_commands entries must be non-empty"));
        }
        Ok(())
    }

    /// Apply `AGENT_MAKER_*` overrides read through `lookup`.
    ///
    /// Unknown privacy levels fall back to `standard`; a length that does not
    /// parse keeps the current value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_PRIVACY) {
            self.privacy = Privacy::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown privacy level, using standard");
                Privacy::Standard
            });
        }
        if let Some(raw) = lookup(ENV_TRACE_ENABLED) {
            self.tracing_enabled = parse_flag(&raw);
        }
        if let Some(raw) = lookup(ENV_REDACT_PLACEHOLDER) {
            self.redact_placeholder = raw;
        }
        if let Some(raw) = lookup(ENV_MAX_VALUE_LEN) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_value_length = n,
                _ => warn!(value = %raw, "ignoring invalid max value length"),
            }
        }
        debug!(privacy = ?self.privacy, tracing_enabled = self.tracing_enabled, "config overrides applied");
    }

    pub fn redactor(&self) -> Redactor {
        Redactor::new(
            self.privacy,
            self.redact_placeholder.clone(),
            self.max_value_length,
        )
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RuntimeConfig::default()`.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        let cfg = RuntimeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RuntimeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RuntimeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("agent-maker.toml");
        let mut cfg = RuntimeConfig::default();
        cfg.privacy = Privacy::Strict;
        cfg.tools.shell_allow.push("cat".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent-maker.toml");
        fs::write(&path, "privacy = \"strict\"\n[tools]\nshell_timeout_secs = 3\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.privacy, Privacy::Strict);
        assert_eq!(cfg.tools.shell_timeout_secs, 3);
        assert_eq!(cfg.tools.shell_allow, vec!["echo", "ls"]);
        assert_eq!(cfg.max_value_length, 2000);
    }

    #[test]
    fn zero_max_steps_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent-maker.toml");
        fs::write(&path, "max_steps = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_steps"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_env_overrides(lookup_from(&[
            (ENV_PRIVACY, "STRICT"),
            (ENV_TRACE_ENABLED, "no"),
            (ENV_REDACT_PLACEHOLDER, "[x]"),
            (ENV_MAX_VALUE_LEN, "50"),
        ]));
        assert_eq!(cfg.privacy, Privacy::Strict);
        assert!(!cfg.tracing_enabled);
        assert_eq!(cfg.redact_placeholder, "[x]");
        assert_eq!(cfg.max_value_length, 50);
    }

    #[test]
    fn invalid_env_values_degrade() {
        let mut cfg = RuntimeConfig::default();
        cfg.privacy = Privacy::Strict;
        cfg.apply_env_overrides(lookup_from(&[
            (ENV_PRIVACY, "paranoid"),
            (ENV_MAX_VALUE_LEN, "lots"),
        ]));
        assert_eq!(cfg.privacy, Privacy::Standard);
        assert_eq!(cfg.max_value_length, 2000);
    }
}
