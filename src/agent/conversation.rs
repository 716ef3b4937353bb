//! Per-agent action-history snapshots.
//!
//! After every turn the executor saves the agent's history to
//! `{key}_{agent_name}_actions.json`. An agent relaunched with the same task
//! input picks the history back up; a finished agent's snapshot is removed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::Action;
use crate::error::PersistenceError;
use crate::orchestration::manager::{read_document, write_document};
use crate::orchestration::types::now_rfc3339;
use crate::orchestration::workspace::WorkspaceKey;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub agent_name: String,
    pub task_input: String,
    pub current_turn: u32,
    #[serde(default)]
    pub action_history: Vec<Action>,
    pub last_updated: String,
}

impl ConversationRecord {
    pub fn new(
        agent_name: impl Into<String>,
        task_input: impl Into<String>,
        current_turn: u32,
        action_history: Vec<Action>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_input: task_input.into(),
            current_turn,
            action_history,
            last_updated: now_rfc3339(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConversationStore {
    key: WorkspaceKey,
    state_dir: PathBuf,
}

impl ConversationStore {
    pub fn new(key: WorkspaceKey, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            key,
            state_dir: state_dir.into(),
        }
    }

    pub fn path_for(&self, agent_name: &str) -> PathBuf {
        self.key.actions_file(&self.state_dir, agent_name)
    }

    pub fn save(&self, record: &ConversationRecord) -> Result<(), PersistenceError> {
        write_document(&self.path_for(&record.agent_name), record, "action history")
    }

    /// The saved record for `agent_name`, if one exists for `task_input`.
    pub fn load(&self, agent_name: &str, task_input: &str) -> Option<ConversationRecord> {
        read_document::<ConversationRecord>(&self.path_for(agent_name))
            .ok()
            .flatten()
            .filter(|record| record.task_input == task_input)
    }

    pub fn remove(&self, agent_name: &str) {
        remove_if_present(&self.path_for(agent_name));
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::{ActionKind, ToolOutcome};

    fn store(dir: &tempfile::TempDir) -> ConversationStore {
        ConversationStore::new(WorkspaceKey::for_path(Path::new("/tmp/conv/ws")), dir.path())
    }

    fn action() -> Action {
        Action {
            turn: 1,
            call_id: "c1".into(),
            tool_name: "file_read".into(),
            kind: ActionKind::Tool,
            arguments: serde_json::json!({"path": "x"}),
            outcome: ToolOutcome::success("x"),
        }
    }

    #[test]
    fn saved_history_is_restored_for_the_same_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .save(&ConversationRecord::new("alpha", "task", 1, vec![action()]))
            .unwrap();

        let record = store.load("alpha", "task").unwrap();
        assert_eq!(record.current_turn, 1);
        assert_eq!(record.action_history, vec![action()]);
        assert!(store.load("alpha", "other task").is_none());
    }

    #[test]
    fn remove_deletes_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .save(&ConversationRecord::new("alpha", "task", 1, vec![]))
            .unwrap();
        store.remove("alpha");
        assert!(!store.path_for("alpha").exists());
        store.remove("alpha");
    }
}
