//! Per-workspace cache of [`HierarchyManager`] instances.
//!
//! The registry is constructed once by the entry point and handed to every
//! component that needs hierarchy access, so that all of them share a single
//! manager (and therefore a single in-memory copy of the state) per workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::manager::HierarchyManager;
use super::workspace::WorkspaceKey;

/// Lazily populated map from workspace key to its manager.
#[derive(Clone)]
pub struct HierarchyRegistry {
    state_dir: PathBuf,
    managers: Arc<Mutex<HashMap<String, Arc<HierarchyManager>>>>,
}

impl HierarchyRegistry {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            managers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Directory holding every workspace's persisted files.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Return the manager for `workspace`, creating it on first use.
    pub fn manager_for(&self, workspace: &Path) -> Arc<HierarchyManager> {
        self.manager_for_key(WorkspaceKey::for_path(workspace))
    }

    pub fn manager_for_key(&self, key: WorkspaceKey) -> Arc<HierarchyManager> {
        let mut managers = self
            .managers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        managers
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(HierarchyManager::open(key, &self.state_dir)))
            .clone()
    }

    /// Number of workspaces with a cached manager.
    pub fn len(&self) -> usize {
        self.managers
            .lock()
            .map(|m| m.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
