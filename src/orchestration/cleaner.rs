//! Startup reconciliation of leftover workspace state.
//!
//! Before a top-level run begins, [`clean_before_start`] decides what to do
//! with whatever a previous run left on disk:
//!
//! | Condition                              | Action                         |
//! |----------------------------------------|--------------------------------|
//! | `force_new`                            | reset context and stack        |
//! | bottom frame matches the new input     | keep everything (resume)       |
//! | other frames present                   | keep everything, caller refuses |
//! | empty stack                            | mark `running` agents interrupted |
//!
//! A non-matching stack is retained rather than discarded; only an explicit
//! `force_new` destroys state. `session::start_run` turns `StaleRetained`
//! into an error so a new task never lands on top of an interrupted one.

use serde::Serialize;

use super::manager::HierarchyManager;
use crate::error::PersistenceError;

/// What the cleaner did, for logging and for the `start` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CleanReport {
    ForcedReset { discarded_frames: usize },
    Resuming { stack_depth: usize },
    StaleRetained { stack_depth: usize },
    Fresh { reconciled_agents: usize },
}

pub fn clean_before_start(
    manager: &HierarchyManager,
    new_user_input: &str,
    force_new: bool,
) -> Result<CleanReport, PersistenceError> {
    let key = manager.workspace_key().clone();

    if force_new {
        let discarded_frames = manager.force_reset()?;
        tracing::info!(workspace = %key, discarded_frames, "Forced fresh start");
        return Ok(CleanReport::ForcedReset { discarded_frames });
    }

    let stack = manager.stack();
    if let Some(bottom) = stack.first() {
        let stack_depth = stack.len();
        if bottom.user_input == new_user_input {
            tracing::info!(workspace = %key, stack_depth, agent = %bottom.agent_name, "Resuming interrupted task");
            return Ok(CleanReport::Resuming { stack_depth });
        }
        tracing::warn!(
            workspace = %key,
            stack_depth,
            previous_input = %bottom.user_input,
            "Stack holds a different interrupted task; leaving it in place"
        );
        return Ok(CleanReport::StaleRetained { stack_depth });
    }

    let reconciled_agents = manager.reconcile_running_agents()?;
    if reconciled_agents > 0 {
        tracing::info!(workspace = %key, reconciled_agents, "Marked stale running agents as interrupted");
    }
    Ok(CleanReport::Fresh { reconciled_agents })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::{AgentNode, AgentRunStatus, StackFrame};
    use crate::orchestration::workspace::WorkspaceKey;
    use std::path::Path;

    fn manager(dir: &tempfile::TempDir) -> HierarchyManager {
        HierarchyManager::open(WorkspaceKey::for_path(Path::new("/tmp/cleaner/ws")), dir.path())
    }

    #[test]
    fn force_new_discards_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);
        mgr.push_frame(StackFrame::new("alpha", "old")).unwrap();

        let report = clean_before_start(&mgr, "new", true).unwrap();
        assert_eq!(report, CleanReport::ForcedReset { discarded_frames: 1 });
        assert_eq!(mgr.depth(), 0);
    }

    #[test]
    fn matching_input_is_left_for_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);
        mgr.push_frame(StackFrame::new("alpha", "task")).unwrap();
        mgr.push_frame(StackFrame::new("beta", "sub")).unwrap();

        let report = clean_before_start(&mgr, "task", false).unwrap();
        assert_eq!(report, CleanReport::Resuming { stack_depth: 2 });
        assert_eq!(mgr.depth(), 2);
    }

    #[test]
    fn different_input_keeps_stale_stack() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);
        mgr.push_frame(StackFrame::new("alpha", "task")).unwrap();

        let report = clean_before_start(&mgr, "another", false).unwrap();
        assert_eq!(report, CleanReport::StaleRetained { stack_depth: 1 });
        assert_eq!(mgr.depth(), 1);
    }

    #[test]
    fn empty_stack_reconciles_running_agents() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir);
        let id = "alpha-1".to_string();
        mgr.register_agent(
            &id,
            AgentNode {
                agent_name: "alpha".into(),
                level: 1,
                parent_id: None,
                depth: 0,
                started_at: "2026-01-01T00:00:00Z".into(),
            },
        )
        .unwrap();

        let report = clean_before_start(&mgr, "task", false).unwrap();
        assert_eq!(report, CleanReport::Fresh { reconciled_agents: 1 });
        assert_eq!(mgr.context().agents_status[&id], AgentRunStatus::Interrupted);
    }
}
