//! Trace persistence under `<run_dir>/<run_id>/trace.jsonl`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::redact::Redactor;
use crate::core::types::TraceEvent;

pub const TRACE_FILE_NAME: &str = "trace.jsonl";

/// Path of the trace file for `run_id`.
pub fn trace_path(run_dir: &Path, run_id: &str) -> PathBuf {
    run_dir.join(run_id).join(TRACE_FILE_NAME)
}

/// Redact every event and write one JSON object per line.
///
/// The in-memory events are left untouched.
#[instrument(skip_all, fields(run_id, events = events.len()))]
pub fn write_trace(
    run_dir: &Path,
    run_id: &str,
    events: &[TraceEvent],
    redactor: &Redactor,
) -> Result<PathBuf> {
    let path = trace_path(run_dir, run_id);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create run dir {}", dir.display()))?;
    }

    let mut buf = Vec::new();
    for event in events {
        let redacted = redactor.redact(event);
        serde_json::to_writer(&mut buf, &redacted).context("serialize trace event")?;
        buf.push(b'\n');
    }

    let mut file =
        fs::File::create(&path).with_context(|| format!("create trace {}", path.display()))?;
    file.write_all(&buf)
        .with_context(|| format!("write trace {}", path.display()))?;
    debug!(path = %path.display(), "trace written");
    Ok(path)
}

/// Read a trace file back, one event per non-empty line.
pub fn read_trace(path: &Path) -> Result<Vec<TraceEvent>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read trace {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse trace {} line {}", path.display(), idx + 1))
        })
        .collect()
}
