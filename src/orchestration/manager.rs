//! Per-workspace owner of the persisted Context and Stack.
//!
//! [`HierarchyManager`] keeps an in-memory copy of both records behind a
//! `Mutex` and writes the affected file on every mutation, before the mutation
//! becomes visible in memory. A failed write leaves memory untouched, so the
//! in-memory sequence and the file on disk never diverge.
//!
//! **Durability model:** every write goes to a temp file that is then renamed
//! over the target, so a crash leaves either the previous or the new snapshot,
//! never a half-written one. Reads are forgiving: a missing or unparsable file
//! is treated as "no prior state".

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{
    AgentId, AgentNode, AgentRunStatus, Context, ContextDocument, Instruction, ResumeOutcome,
    StackDocument, StackFrame, now_rfc3339,
};
use super::workspace::WorkspaceKey;
use crate::error::PersistenceError;

struct HierarchyState {
    context: Context,
    stack: Vec<StackFrame>,
}

/// Owner of one workspace's Context/Stack pair.
///
/// Obtain instances through [`super::registry::HierarchyRegistry`] so that all
/// components working on a workspace share one manager.
pub struct HierarchyManager {
    key: WorkspaceKey,
    context_path: PathBuf,
    stack_path: PathBuf,
    state: Mutex<HierarchyState>,
}

impl HierarchyManager {
    /// Open the manager for `key`, loading whatever state is on disk.
    pub fn open(key: WorkspaceKey, state_dir: &Path) -> Self {
        let context_path = key.context_file(state_dir);
        let stack_path = key.stack_file(state_dir);

        let context = read_document::<ContextDocument>(&context_path)
            .ok()
            .flatten()
            .map(|doc| doc.current)
            .unwrap_or_default();
        let stack = read_document::<StackDocument>(&stack_path)
            .ok()
            .flatten()
            .map(|doc| doc.stack)
            .unwrap_or_default();

        tracing::debug!(
            workspace = %key,
            instructions = context.instructions.len(),
            stack_depth = stack.len(),
            "Hierarchy manager opened"
        );

        Self {
            key,
            context_path,
            stack_path,
            state: Mutex::new(HierarchyState { context, stack }),
        }
    }

    pub fn workspace_key(&self) -> &WorkspaceKey {
        &self.key
    }

    pub fn context_path(&self) -> &Path {
        &self.context_path
    }

    pub fn stack_path(&self) -> &Path {
        &self.stack_path
    }

    /// Snapshot of the current context.
    pub fn context(&self) -> Context {
        self.lock().context.clone()
    }

    /// Snapshot of the current stack, bottom first.
    pub fn stack(&self) -> Vec<StackFrame> {
        self.lock().stack.clone()
    }

    pub fn depth(&self) -> usize {
        self.lock().stack.len()
    }

    // -----------------------------------------------------------------------
    // Instructions and agent bookkeeping
    // -----------------------------------------------------------------------

    /// Append a top-level instruction and persist it before returning its id.
    pub fn start_new_instruction(&self, text: &str) -> Result<String, PersistenceError> {
        let instruction = Instruction::new(text);
        let id = instruction.id.clone();
        self.mutate_context(|ctx| ctx.instructions.push(instruction))?;
        tracing::info!(workspace = %self.key, instruction_id = %id, "Instruction registered");
        Ok(id)
    }

    /// Record a new agent invocation in the hierarchy, marked `running`.
    pub fn register_agent(&self, agent_id: &AgentId, node: AgentNode) -> Result<(), PersistenceError> {
        self.mutate_context(|ctx| {
            ctx.hierarchy.insert(agent_id.clone(), node);
            ctx.agents_status
                .insert(agent_id.clone(), AgentRunStatus::Running);
        })
    }

    pub fn set_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentRunStatus,
    ) -> Result<(), PersistenceError> {
        self.mutate_context(|ctx| {
            ctx.agents_status.insert(agent_id.clone(), status);
        })
    }

    /// Rewrite every `running` agent status to `interrupted`.
    ///
    /// Returns the number of entries changed; writes nothing when zero.
    pub fn reconcile_running_agents(&self) -> Result<usize, PersistenceError> {
        let running = self
            .lock()
            .context
            .agents_status
            .values()
            .filter(|s| **s == AgentRunStatus::Running)
            .count();
        if running == 0 {
            return Ok(0);
        }
        self.mutate_context(|ctx| {
            for status in ctx.agents_status.values_mut() {
                if *status == AgentRunStatus::Running {
                    *status = AgentRunStatus::Interrupted;
                }
            }
        })?;
        Ok(running)
    }

    // -----------------------------------------------------------------------
    // Stack
    // -----------------------------------------------------------------------

    /// Push a frame and persist. Returns the frame's index (its depth).
    pub fn push_frame(&self, frame: StackFrame) -> Result<usize, PersistenceError> {
        let mut state = self.lock();
        let mut next = state.stack.clone();
        next.push(frame);
        write_document(&self.stack_path, &StackDocument { stack: next.clone() }, "stack")?;
        let index = next.len() - 1;
        state.stack = next;
        tracing::debug!(workspace = %self.key, index, "Frame pushed");
        Ok(index)
    }

    /// Remove the frame at `index` and everything above it, then persist.
    ///
    /// Returns the removed frame at `index`.
    pub fn pop_frame(&self, index: usize) -> Result<StackFrame, PersistenceError> {
        let mut state = self.lock();
        let depth = state.stack.len();
        if index >= depth {
            return Err(PersistenceError::FrameOutOfRange { index, depth });
        }
        let mut next = state.stack.clone();
        let removed = next.drain(index..).next();
        write_document(&self.stack_path, &StackDocument { stack: next.clone() }, "stack")?;
        state.stack = next;
        tracing::debug!(workspace = %self.key, index, "Frame popped");
        removed.ok_or(PersistenceError::FrameOutOfRange { index, depth })
    }

    /// Enter the bottom frame for a top-level run.
    ///
    /// If the persisted bottom frame describes the same agent and input (a
    /// relaunch after interruption), the stack is truncated to that frame and
    /// its index `0` is returned. An empty stack gets `frame` pushed. A stack
    /// holding some other task is left alone and refused.
    pub fn adopt_or_push_root(&self, frame: StackFrame) -> Result<usize, PersistenceError> {
        {
            let mut state = self.lock();
            let bottom_matches = state
                .stack
                .first()
                .map(|bottom| bottom.matches(&frame.agent_name, &frame.user_input));
            match bottom_matches {
                None => {}
                Some(true) => {
                    if state.stack.len() > 1 {
                        let next = state.stack[..1].to_vec();
                        write_document(&self.stack_path, &StackDocument { stack: next.clone() }, "stack")?;
                        state.stack = next;
                    }
                    tracing::info!(workspace = %self.key, agent = %frame.agent_name, "Adopted interrupted bottom frame");
                    return Ok(0);
                }
                Some(false) => {
                    return Err(PersistenceError::StackOccupied {
                        depth: state.stack.len(),
                    });
                }
            }
        }
        self.push_frame(frame)
    }

    // -----------------------------------------------------------------------
    // Resume / reset
    // -----------------------------------------------------------------------

    /// Inspect the persisted stack for an interrupted task.
    ///
    /// Reads the file rather than the cached copy so that a front end sees
    /// exactly what a crashed run left behind. Never fails.
    pub fn resume(&self) -> ResumeOutcome {
        let stack = match read_document::<StackDocument>(&self.stack_path) {
            Ok(Some(doc)) => doc.stack,
            Ok(None) => {
                return ResumeOutcome::NotFound {
                    message: format!(
                        "No interrupted task found (file does not exist: {})",
                        self.stack_path.display()
                    ),
                };
            }
            Err(message) => {
                return ResumeOutcome::NotFound {
                    message: format!("Failed to read task: {message}"),
                };
            }
        };

        let Some(bottom) = stack.first() else {
            return ResumeOutcome::NotFound {
                message: "No interrupted task (stack empty)".to_string(),
            };
        };

        if bottom.agent_name.is_empty() || bottom.user_input.is_empty() {
            return ResumeOutcome::NotFound {
                message: "Task data incomplete".to_string(),
            };
        }

        ResumeOutcome::Found {
            agent_name: bottom.agent_name.clone(),
            user_input: bottom.user_input.clone(),
            interrupted_at: bottom.start_time.clone(),
            stack_depth: stack.len(),
        }
    }

    /// Discard all state: clear the current context and empty the stack.
    ///
    /// Returns the number of frames discarded.
    pub fn force_reset(&self) -> Result<usize, PersistenceError> {
        let mut state = self.lock();
        let discarded = state.stack.len();

        write_document(
            &self.context_path,
            &ContextDocument {
                current: Context::default(),
                updated_at: Some(now_rfc3339()),
            },
            "context",
        )?;
        state.context = Context::default();

        write_document(&self.stack_path, &StackDocument::default(), "stack")?;
        state.stack.clear();

        tracing::info!(workspace = %self.key, discarded, "Workspace state reset");
        Ok(discarded)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, HierarchyState> {
        // A panic while holding the lock cannot leave the state half-updated:
        // memory is only assigned after a successful write.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mutate_context(&self, apply: impl FnOnce(&mut Context)) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        let mut next = state.context.clone();
        apply(&mut next);
        write_document(
            &self.context_path,
            &ContextDocument {
                current: next.clone(),
                updated_at: Some(now_rfc3339()),
            },
            "context",
        )?;
        state.context = next;
        Ok(())
    }
}

/// Read and parse a JSON document.
///
/// `Ok(None)` when the file does not exist; `Err` with a description when it
/// exists but cannot be read or parsed.
pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return Err(e.to_string());
        }
    };
    serde_json::from_str(&contents).map(Some).map_err(|e| {
        tracing::warn!("Ignoring unparsable state file {}: {}", path.display(), e);
        e.to_string()
    })
}

/// Atomically replace `path` with the pretty-printed JSON of `value`.
pub(crate) fn write_document<T: Serialize>(
    path: &Path,
    value: &T,
    what: &'static str,
) -> Result<(), PersistenceError> {
    let mut buf = serde_json::to_string_pretty(value)
        .map_err(|source| PersistenceError::Serialize { what, source })?;
    buf.push('\n');

    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_manager(dir: &TempDir) -> HierarchyManager {
        let key = WorkspaceKey::for_path(Path::new("/tmp/stratum-tests/task"));
        HierarchyManager::open(key, dir.path())
    }

    fn persisted_stack(mgr: &HierarchyManager) -> Vec<StackFrame> {
        let raw = fs::read_to_string(mgr.stack_path()).unwrap();
        serde_json::from_str::<StackDocument>(&raw).unwrap().stack
    }

    #[test]
    fn instruction_is_persisted_immediately() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);

        let id = mgr.start_new_instruction("Summarize file X").unwrap();

        let raw = fs::read_to_string(mgr.context_path()).unwrap();
        let doc: ContextDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc.current.instructions.len(), 1);
        assert_eq!(doc.current.instructions[0].id, id);
        assert_eq!(doc.current.instructions[0].text, "Summarize file X");
    }

    #[test]
    fn every_push_and_pop_is_flushed() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);

        let a = mgr.push_frame(StackFrame::new("alpha", "root task")).unwrap();
        assert_eq!(persisted_stack(&mgr), mgr.stack());
        let b = mgr.push_frame(StackFrame::new("beta", "child task")).unwrap();
        assert_eq!(persisted_stack(&mgr), mgr.stack());
        assert_eq!((a, b), (0, 1));

        let popped = mgr.pop_frame(b).unwrap();
        assert_eq!(popped.agent_name, "beta");
        assert_eq!(persisted_stack(&mgr), mgr.stack());
        assert_eq!(mgr.depth(), 1);
    }

    #[test]
    fn pop_truncates_everything_above_the_index() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.push_frame(StackFrame::new("a", "1")).unwrap();
        mgr.push_frame(StackFrame::new("b", "2")).unwrap();
        mgr.push_frame(StackFrame::new("c", "3")).unwrap();

        mgr.pop_frame(1).unwrap();
        assert_eq!(mgr.depth(), 1);
        assert_eq!(persisted_stack(&mgr).len(), 1);
    }

    #[test]
    fn pop_out_of_range_is_an_error_without_side_effect() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.push_frame(StackFrame::new("a", "1")).unwrap();

        let err = mgr.pop_frame(3).unwrap_err();
        assert!(matches!(err, PersistenceError::FrameOutOfRange { index: 3, depth: 1 }));
        assert_eq!(mgr.depth(), 1);
    }

    #[test]
    fn reopened_manager_sees_persisted_state() {
        let dir = TempDir::new().unwrap();
        {
            let mgr = open_manager(&dir);
            mgr.start_new_instruction("first").unwrap();
            mgr.push_frame(StackFrame::new("alpha", "first")).unwrap();
        }
        let mgr = open_manager(&dir);
        assert_eq!(mgr.context().instructions.len(), 1);
        assert_eq!(mgr.depth(), 1);
    }

    #[test]
    fn resume_reports_bottom_frame() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.push_frame(StackFrame::new("alpha_agent", "Summarize file X")).unwrap();
        mgr.push_frame(StackFrame::new("coder_agent", "write summary")).unwrap();

        match mgr.resume() {
            ResumeOutcome::Found {
                agent_name,
                user_input,
                stack_depth,
                ..
            } => {
                assert_eq!(agent_name, "alpha_agent");
                assert_eq!(user_input, "Summarize file X");
                assert_eq!(stack_depth, 2);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn resume_without_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        match mgr.resume() {
            ResumeOutcome::NotFound { message } => assert!(message.contains("does not exist")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn resume_with_empty_stack_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.push_frame(StackFrame::new("alpha", "x")).unwrap();
        mgr.pop_frame(0).unwrap();
        match mgr.resume() {
            ResumeOutcome::NotFound { message } => assert!(message.contains("stack empty")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn resume_with_corrupt_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        fs::write(mgr.stack_path(), "{not json").unwrap();
        assert!(!mgr.resume().is_found());
    }

    #[test]
    fn corrupt_files_open_as_empty_state() {
        let dir = TempDir::new().unwrap();
        let key = WorkspaceKey::for_path(Path::new("/tmp/stratum-tests/task"));
        fs::write(key.context_file(dir.path()), "garbage").unwrap();
        fs::write(key.stack_file(dir.path()), "[1, 2").unwrap();

        let mgr = HierarchyManager::open(key, dir.path());
        assert!(mgr.context().instructions.is_empty());
        assert_eq!(mgr.depth(), 0);
    }

    #[test]
    fn force_reset_clears_everything() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.start_new_instruction("task").unwrap();
        mgr.push_frame(StackFrame::new("alpha", "task")).unwrap();
        mgr.push_frame(StackFrame::new("beta", "sub")).unwrap();

        assert_eq!(mgr.force_reset().unwrap(), 2);
        assert!(mgr.context().instructions.is_empty());
        assert!(persisted_stack(&mgr).is_empty());
        assert!(!mgr.resume().is_found());
    }

    #[test]
    fn adopt_root_truncates_to_matching_bottom() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.push_frame(StackFrame::new("alpha", "task")).unwrap();
        mgr.push_frame(StackFrame::new("beta", "sub")).unwrap();

        let index = mgr.adopt_or_push_root(StackFrame::new("alpha", "task")).unwrap();
        assert_eq!(index, 0);
        assert_eq!(persisted_stack(&mgr).len(), 1);
    }

    #[test]
    fn adopt_root_refuses_a_different_task() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        mgr.push_frame(StackFrame::new("alpha", "old task")).unwrap();

        let err = mgr.adopt_or_push_root(StackFrame::new("alpha", "new task")).unwrap_err();
        assert!(matches!(err, PersistenceError::StackOccupied { depth: 1 }));
        assert_eq!(persisted_stack(&mgr).len(), 1);
        assert_eq!(persisted_stack(&mgr)[0].user_input, "old task");
    }

    #[test]
    fn adopt_root_pushes_onto_empty_stack() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);

        let index = mgr.adopt_or_push_root(StackFrame::new("alpha", "task")).unwrap();
        assert_eq!(index, 0);
        assert_eq!(mgr.depth(), 1);
    }

    #[test]
    fn reconcile_marks_running_agents_interrupted() {
        let dir = TempDir::new().unwrap();
        let mgr = open_manager(&dir);
        let node = AgentNode {
            agent_name: "alpha".into(),
            level: 2,
            parent_id: None,
            depth: 0,
            started_at: now_rfc3339(),
        };
        mgr.register_agent(&"alpha_1".to_string(), node).unwrap();

        assert_eq!(mgr.reconcile_running_agents().unwrap(), 1);
        assert_eq!(
            mgr.context().agents_status.get("alpha_1"),
            Some(&AgentRunStatus::Interrupted)
        );
        assert_eq!(mgr.reconcile_running_agents().unwrap(), 0);
    }
}
