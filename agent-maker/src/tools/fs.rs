//! `fs.read` and `fs.write`, confined to the workspace.

use std::fs;
use std::io::Read;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::debug;

use crate::core::state::ConversationState;
use crate::io::workspace::Workspace;
use crate::tools::{Tool, flag, required_str};

pub const READ_NAME: &str = "fs.read";
pub const READ_DESCRIPTION: &str = "Read a UTF-8 file inside the workspace (read-only).";
pub const WRITE_NAME: &str = "fs.write";
pub const WRITE_DESCRIPTION: &str =
    "Write a file inside the workspace. Existing files are kept unless overwrite=true.";

/// Characters of file content returned by `fs.read`.
pub const MAX_READ_CHARS: usize = 10_000;
/// Bytes read from disk: enough for `MAX_READ_CHARS` of four-byte characters.
const MAX_READ_BYTES: u64 = MAX_READ_CHARS as u64 * 4;

#[derive(Debug, Clone)]
pub struct FsReadTool {
    workspace: Workspace,
}

impl FsReadTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for FsReadTool {
    fn name(&self) -> &'static str {
        READ_NAME
    }

    fn description(&self) -> &'static str {
        READ_DESCRIPTION
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        })
    }

    fn invoke(&self, args: &Value, _state: &mut ConversationState) -> Result<Value> {
        let rel = required_str(args, "path")?;
        let path = self.workspace.resolve(rel)?;
        if !path.is_file() {
            return Ok(json!({"ok": false, "error": format!("file not found: {rel}")}));
        }
        let (text, more_on_disk) = read_prefix(&path).with_context(|| format!("read {rel}"))?;
        let Some(text) = text else {
            bail!("file is not valid UTF-8: {rel}");
        };
        let truncated = more_on_disk || text.chars().count() > MAX_READ_CHARS;
        let content: String = if truncated {
            text.chars().take(MAX_READ_CHARS).collect()
        } else {
            text
        };
        debug!(path = rel, truncated, "file read");
        Ok(json!({
            "ok": true,
            "path": self.workspace.display_relative(&path),
            "content": content,
            "truncated": truncated,
        }))
    }
}

/// Read at most `MAX_READ_BYTES` of `path`. Returns the decoded text (`None` if
/// it is not UTF-8) and whether the file continues past the bytes read.
fn read_prefix(path: &std::path::Path) -> Result<(Option<String>, bool)> {
    let file = fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.take(MAX_READ_BYTES + 1).read_to_end(&mut bytes)?;
    let more_on_disk = bytes.len() as u64 > MAX_READ_BYTES;
    bytes.truncate(MAX_READ_BYTES as usize);

    let text = match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        // The byte cap may split the last character.
        Err(err) if more_on_disk && err.utf8_error().error_len().is_none() => {
            let valid = err.utf8_error().valid_up_to();
            let mut bytes = err.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).ok()
        }
        Err(_) => None,
    };
    Ok((text, more_on_disk))
}

#[derive(Debug, Clone)]
pub struct FsWriteTool {
    workspace: Workspace,
}

impl FsWriteTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for FsWriteTool {
    fn name(&self) -> &'static str {
        WRITE_NAME
    }

    fn description(&self) -> &'static str {
        WRITE_DESCRIPTION
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"},
                "overwrite": {"type": "boolean"},
            },
            "required": ["path", "content"],
        })
    }

    fn invoke(&self, args: &Value, _state: &mut ConversationState) -> Result<Value> {
        let rel = required_str(args, "path")?;
        let content = required_str(args, "content")?;
        let overwrite = flag(args, "overwrite");
        let path = self.workspace.resolve(rel)?;

        if path.is_dir() {
            bail!("path is a directory: {rel}");
        }
        if fs::symlink_metadata(&path).is_ok() && !overwrite {
            return Ok(json!({
                "ok": false,
                "error": format!("file already exists, pass overwrite=true to replace: {rel}"),
            }));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create parent of {rel}"))?;
        }
        fs::write(&path, content).with_context(|| format!("write {rel}"))?;
        debug!(path = rel, bytes = content.len(), overwrite, "file written");
        Ok(json!({
            "ok": true,
            "path": self.workspace.display_relative(&path),
            "bytes": content.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools() -> (tempfile::TempDir, FsReadTool, FsWriteTool) {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::open(temp.path()).expect("workspace");
        (temp, FsReadTool::new(ws.clone()), FsWriteTool::new(ws))
    }

    #[test]
    fn write_refuses_overwrite_then_round_trips() {
        let (_temp, read, write) = tools();
        let mut state = ConversationState::new();

        let first = write
            .invoke(&json!({"path": "notes/a.txt", "content": "one"}), &mut state)
            .expect("write");
        assert_eq!(first, json!({"ok": true, "path": "notes/a.txt", "bytes": 3}));

        let again = write
            .invoke(&json!({"path": "notes/a.txt", "content": "two"}), &mut state)
            .expect("write");
        assert_eq!(again["ok"], false);

        let forced = write
            .invoke(
                &json!({"path": "notes/a.txt", "content": "two", "overwrite": true}),
                &mut state,
            )
            .expect("write");
        assert_eq!(forced["ok"], true);

        let back = read
            .invoke(&json!({"path": "notes/a.txt"}), &mut state)
            .expect("read");
        assert_eq!(back["content"], "two");
        assert_eq!(back["truncated"], false);
    }

    #[test]
    fn bytes_counts_utf8_length() {
        let (_temp, _read, write) = tools();
        let result = write
            .invoke(&json!({"path": "u.txt", "content": "héllo"}), &mut ConversationState::new())
            .expect("write");
        assert_eq!(result["bytes"], 6);
    }

    #[test]
    fn traversal_is_rejected_without_mutation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("ws");
        fs::create_dir_all(&root).expect("mkdir");
        let write = FsWriteTool::new(Workspace::open(&root).expect("workspace"));

        let err = write
            .invoke(
                &json!({"path": "../escape/x.txt", "content": "x"}),
                &mut ConversationState::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("escapes workspace"));
        assert!(!temp.path().join("escape").exists());
    }

    #[test]
    fn missing_file_is_ok_false() {
        let (_temp, read, _write) = tools();
        let result = read
            .invoke(&json!({"path": "nope.txt"}), &mut ConversationState::new())
            .expect("read");
        assert_eq!(result["ok"], false);
    }

    #[test]
    fn directory_is_not_readable_as_file() {
        let (temp, read, _write) = tools();
        fs::create_dir_all(temp.path().join("dir")).expect("mkdir");
        let result = read
            .invoke(&json!({"path": "dir"}), &mut ConversationState::new())
            .expect("read");
        assert_eq!(result["ok"], false);
    }

    #[test]
    fn long_content_is_truncated() {
        let (temp, read, _write) = tools();
        fs::write(temp.path().join("big.txt"), "x".repeat(MAX_READ_CHARS + 10)).expect("write");
        let result = read
            .invoke(&json!({"path": "big.txt"}), &mut ConversationState::new())
            .expect("read");
        assert_eq!(result["truncated"], true);
        assert_eq!(
            result["content"].as_str().map(|s| s.chars().count()),
            Some(MAX_READ_CHARS)
        );
    }

    #[test]
    fn large_multibyte_file_is_capped_by_characters() {
        let (temp, read, _write) = tools();
        let body = "€".repeat(MAX_READ_CHARS * 2);
        fs::write(temp.path().join("euro.txt"), &body).expect("write");
        let result = read
            .invoke(&json!({"path": "euro.txt"}), &mut ConversationState::new())
            .expect("read");
        assert_eq!(result["truncated"], true);
        let content = result["content"].as_str().expect("content");
        assert_eq!(content.chars().count(), MAX_READ_CHARS);
        assert!(content.chars().all(|c| c == '€'));
    }

    #[test]
    fn byte_cap_splitting_a_character_still_decodes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("split.txt");
        let mut body = "a".repeat(MAX_READ_BYTES as usize - 1).into_bytes();
        body.extend_from_slice("€€".as_bytes());
        fs::write(&path, body).expect("write");

        let (text, more_on_disk) = read_prefix(&path).expect("read");
        assert!(more_on_disk);
        assert_eq!(text.expect("utf8").len(), MAX_READ_BYTES as usize - 1);
    }

    #[test]
    fn non_utf8_is_an_error() {
        let (temp, read, _write) = tools();
        fs::write(temp.path().join("bin.dat"), [0xff, 0xfe, 0x00]).expect("write");
        assert!(
            read.invoke(&json!({"path": "bin.dat"}), &mut ConversationState::new())
                .is_err()
        );
    }
}
