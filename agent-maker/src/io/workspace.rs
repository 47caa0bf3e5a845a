//! Workspace root and path containment.
//!
//! Every path-facing tool resolves its target through [`Workspace::resolve`].
//! The check canonicalizes the deepest existing ancestor (following symlinks),
//! lexically normalizes the rest, and requires the canonical root as a prefix.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open an existing directory as the workspace root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .with_context(|| format!("resolve workspace root {}", root.display()))?;
        if !canonical.is_dir() {
            bail!("workspace root is not a directory: {}", root.display());
        }
        Ok(Self { root: canonical })
    }

    /// Canonical absolute root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `rel` against the root and refuse anything that escapes it.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let joined = self.root.join(rel);
        let resolved = resolve_through_existing(&joined)?;
        if !resolved.starts_with(&self.root) {
            warn!(path = rel, "path escapes workspace");
            bail!("path escapes workspace: {rel}");
        }
        debug!(path = rel, resolved = %resolved.display(), "resolved workspace path");
        Ok(resolved)
    }

    /// Path relative to the root, with `/` separators, for reporting.
    pub fn display_relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Canonicalize the deepest existing ancestor of `path` and append the
/// remaining components after lexical normalization.
fn resolve_through_existing(path: &Path) -> Result<PathBuf> {
    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut rest: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if fs::symlink_metadata(existing).is_ok() {
            break;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => bail!("cannot resolve path {}", path.display()),
        }
    }
    let mut resolved = existing
        .canonicalize()
        .with_context(|| format!("resolve {}", existing.display()))?;
    for name in rest.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
