//! Workspace identity and the on-disk layout of per-workspace state.
//!
//! A workspace is addressed by `{short hash}_{trailing segment}`: the first 8 hex
//! characters of the SHA-256 of its absolute path, followed by the last path
//! component. Paths are normalized lexically first (`.` and `..` folded,
//! trailing separators dropped), so every spelling of the same directory lands
//! on the same Context/Stack file pair.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// Number of hex characters of the path digest kept in the key.
const SHORT_HASH_LEN: usize = 8;

/// Deterministic identity of one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceKey {
    key: String,
    absolute: PathBuf,
}

impl WorkspaceKey {
    /// Derive the key for `workspace`, resolving relative paths against the
    /// current directory. The path does not need to exist.
    pub fn for_path(workspace: &Path) -> Self {
        let absolute = normalize(
            &std::path::absolute(workspace).unwrap_or_else(|_| workspace.to_path_buf()),
        );
        let rendered = absolute.to_string_lossy();

        let digest = Sha256::digest(rendered.as_bytes());
        let short_hash = &hex::encode(digest)[..SHORT_HASH_LEN];

        let trailing = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "root".to_string());

        Self {
            key: format!("{short_hash}_{trailing}"),
            absolute,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The absolute workspace path the key was derived from.
    pub fn absolute_path(&self) -> &Path {
        &self.absolute
    }

    pub fn context_file(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(format!("{}_context.json", self.key))
    }

    pub fn stack_file(&self, state_dir: &Path) -> PathBuf {
        state_dir.join(format!("{}_stack.json", self.key))
    }

    /// Action-history snapshot for one agent running in this workspace.
    pub fn actions_file(&self, state_dir: &Path, agent_name: &str) -> PathBuf {
        state_dir.join(format!("{}_{agent_name}_actions.json", self.key))
    }
}

/// Fold `.` and `..` components without touching the filesystem. `..` at the
/// root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

impl std::fmt::Display for WorkspaceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}
