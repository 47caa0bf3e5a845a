//! `code.search`: find matching lines in the workspace.
//!
//! Uses `rg` when it is installed and enabled, otherwise walks the tree with
//! the same regex/glob semantics. A query that is not a valid regex is matched
//! literally by both engines.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::state::ConversationState;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, find_program, run_command_with_timeout};
use crate::io::workspace::Workspace;
use crate::tools::{Tool, failure, optional_str, required_str};

pub const NAME: &str = "code.search";
pub const DESCRIPTION: &str =
    "Search workspace files for a regex or plain text, optionally filtered by path and globs.";

pub const DEFAULT_MAX_RESULTS: usize = 40;
pub const MAX_LINE_CHARS: usize = 300;
const RIPGREP_TIMEOUT: Duration = Duration::from_secs(10);
/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8000;

#[derive(Debug, Clone)]
pub struct CodeSearchTool {
    workspace: Workspace,
    prefer_ripgrep: bool,
    max_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct LineMatch {
    line: u64,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct FileMatches {
    path: String,
    matches: Vec<LineMatch>,
}

/// Matches grouped per file, in first-seen order, capped at `cap` lines.
#[derive(Debug)]
struct Collector {
    files: Vec<FileMatches>,
    count: usize,
    cap: usize,
}

impl Collector {
    fn new(cap: usize) -> Self {
        Self {
            files: Vec::new(),
            count: 0,
            cap,
        }
    }

    fn full(&self) -> bool {
        self.count >= self.cap
    }

    fn push(&mut self, path: &str, line: u64, text: &str) {
        if self.full() {
            return;
        }
        let entry = LineMatch {
            line,
            text: text.chars().take(MAX_LINE_CHARS).collect(),
        };
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(file) => file.matches.push(entry),
            None => self.files.push(FileMatches {
                path: path.to_string(),
                matches: vec![entry],
            }),
        }
        self.count += 1;
    }
}

/// Include/exclude filters built from `globs`.
#[derive(Debug, Default)]
struct GlobFilter {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
}

#[derive(Debug)]
struct GlobPattern {
    regex: Regex,
    /// Patterns containing `/` match the relative path, others the file name.
    whole_path: bool,
}

impl GlobPattern {
    fn new(glob: &str) -> Result<Self> {
        let trimmed = glob.trim_start_matches("./");
        let regex = Regex::new(&glob_to_regex(trimmed))
            .map_err(|err| anyhow!("invalid glob '{glob}': {err}"))?;
        Ok(Self {
            regex,
            whole_path: trimmed.contains('/'),
        })
    }

    fn matches(&self, rel_path: &str) -> bool {
        if self.whole_path {
            return self.regex.is_match(rel_path);
        }
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.regex.is_match(name)
    }
}

impl GlobFilter {
    fn new(globs: &[String]) -> Result<Self> {
        let mut filter = Self::default();
        for glob in globs {
            match glob.strip_prefix('!') {
                Some(negated) => filter.exclude.push(GlobPattern::new(negated)?),
                None => filter.include.push(GlobPattern::new(glob)?),
            }
        }
        Ok(filter)
    }

    fn allows(&self, rel_path: &str) -> bool {
        if self.exclude.iter().any(|g| g.matches(rel_path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|g| g.matches(rel_path))
    }
}

/// Translate a glob into an anchored regex: `**` spans directories, `*` and
/// `?` stay within one path segment, `{a,b}` is an alternation.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut brace_depth = 0usize;
    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    for _ in 0..brace_depth {
        out.push(')');
    }
    out.push('$');
    out
}

/// Globs arrive as an array or as a comma-separated string.
fn parse_globs(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

struct SearchRequest<'a> {
    query: &'a str,
    /// Compiled query; literal when the input is not a valid regex.
    pattern: Regex,
    literal: bool,
    start: &'a Path,
    globs: Vec<String>,
    cap: usize,
}

/// Arguments for `rg`. Options end at `--` and the search path is anchored
/// with `./`, so workspace entries named like flags stay positional.
fn ripgrep_args(request: &SearchRequest<'_>, rel_start: &str) -> Vec<String> {
    let mut args: Vec<String> = ["--line-number", "--no-heading", "--hidden", "--color", "never"]
        .into_iter()
        .map(str::to_string)
        .collect();
    args.push("--max-count".to_string());
    args.push(request.cap.to_string());
    if request.literal {
        args.push("--fixed-strings".to_string());
    }
    for glob in &request.globs {
        args.push("--glob".to_string());
        args.push(glob.clone());
    }
    args.push("--glob".to_string());
    args.push("!.git".to_string());
    args.push("-e".to_string());
    args.push(request.query.to_string());
    args.push("--".to_string());
    if rel_start.is_empty() {
        args.push(".".to_string());
    } else {
        args.push(format!("./{rel_start}"));
    }
    args
}

impl CodeSearchTool {
    pub fn new(workspace: Workspace, prefer_ripgrep: bool, max_files: usize) -> Self {
        Self {
            workspace,
            prefer_ripgrep,
            max_files,
        }
    }

    #[instrument(skip_all, fields(cap = request.cap))]
    fn run_ripgrep(&self, request: &SearchRequest<'_>) -> Result<Value> {
        let rel_start = self.workspace.display_relative(request.start);
        let mut cmd = Command::new("rg");
        cmd.args(ripgrep_args(request, &rel_start))
            .current_dir(self.workspace.root());

        let output = run_command_with_timeout(cmd, None, RIPGREP_TIMEOUT, DEFAULT_OUTPUT_LIMIT_BYTES)
            .context("run rg")?;
        if output.timed_out {
            return Ok(failure(format!("rg timed out after {:?}", RIPGREP_TIMEOUT)));
        }
        // Exit code 1 means no matches.
        match output.code() {
            Some(0) | Some(1) => {}
            _ => {
                let stderr: String = output.stderr_text().trim().chars().take(1000).collect();
                return Ok(failure(stderr));
            }
        }

        let mut collector = Collector::new(request.cap);
        for line in output.stdout_text().lines() {
            if collector.full() {
                break;
            }
            let mut parts = line.splitn(3, ':');
            let (Some(path), Some(line_no), Some(text)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Ok(line_no) = line_no.parse::<u64>() else {
                continue;
            };
            let path = path.trim_start_matches("./");
            let Ok(resolved) = self.workspace.resolve(path) else {
                continue;
            };
            collector.push(&self.workspace.display_relative(&resolved), line_no, text);
        }
        debug!(files = collector.files.len(), matches = collector.count, "rg search finished");
        Ok(json!({"ok": true, "engine": "ripgrep", "results": collector.files}))
    }

    #[instrument(skip_all, fields(cap = request.cap, max_files = self.max_files))]
    fn run_fallback(&self, request: &SearchRequest<'_>) -> Result<Value> {
        let filter = GlobFilter::new(&request.globs)?;
        let mut collector = Collector::new(request.cap);
        let mut files_seen = 0usize;

        let walker = WalkDir::new(request.start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");
        for entry in walker {
            let Ok(entry) = entry else {
                continue;
            };
            if !entry.file_type().is_file() {
                continue;
            }
            files_seen += 1;
            if files_seen > self.max_files {
                warn!(max_files = self.max_files, "search file cap reached");
                break;
            }
            let rel = self.workspace.display_relative(entry.path());
            if !filter.allows(&rel) {
                continue;
            }
            let Ok(bytes) = fs::read(entry.path()) else {
                continue;
            };
            if bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0) {
                continue;
            }
            let text = String::from_utf8_lossy(&bytes);
            for (idx, line) in text.lines().enumerate() {
                if request.pattern.is_match(line) {
                    collector.push(&rel, idx as u64 + 1, line);
                    if collector.full() {
                        break;
                    }
                }
            }
            if collector.full() {
                break;
            }
        }
        debug!(files_seen, matches = collector.count, "fallback search finished");
        Ok(json!({"ok": true, "engine": "fallback", "results": collector.files}))
    }
}

impl Tool for CodeSearchTool {
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
                "query": {"type": "string"},
                "path": {"type": "string"},
                "globs": {
                    "anyOf": [
                        {"type": "array", "items": {"type": "string"}},
                        {"type": "string"},
                    ]
                },
                "max_results": {"type": "integer"},
            },
            "required": ["query"],
        })
    }

    fn invoke(&self, args: &Value, _state: &mut ConversationState) -> Result<Value> {
        let query = required_str(args, "query")?.trim();
        if query.is_empty() {
            return Ok(failure("code.search requires a non-empty query"));
        }
        let start = match optional_str(args, "path") {
            Some(sub) => self.workspace.resolve(sub)?,
            None => self.workspace.root().to_path_buf(),
        };
        if !start.exists() {
            return Ok(failure(format!(
                "search path not found: {}",
                self.workspace.display_relative(&start)
            )));
        }
        let cap = match args.get("max_results").and_then(Value::as_i64) {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_MAX_RESULTS,
        };
        let (pattern, literal) = match Regex::new(query) {
            Ok(re) => (re, false),
            Err(_) => {
                debug!("query is not a valid regex, matching literally");
                (Regex::new(&regex::escape(query))?, true)
            }
        };
        let request = SearchRequest {
            query,
            pattern,
            literal,
            start: &start,
            globs: parse_globs(args.get("globs")),
            cap,
        };

        if self.prefer_ripgrep && find_program("rg").is_some() {
            self.run_ripgrep(&request)
        } else {
            self.run_fallback(&request)
        }
    }
}
