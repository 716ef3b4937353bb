//! Persisted record types for the hierarchy subsystem.
//!
//! These types form the on-disk vocabulary shared between the
//! [`super::manager::HierarchyManager`], the [`super::cleaner`] and the
//! front ends that inspect a workspace. Everything derives both
//! [`Serialize`] and [`Deserialize`] since it round-trips through JSON files.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one agent invocation within a workspace.
pub type AgentId = String;

/// Return the current UTC time as an RFC 3339 string.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// A top-level request made into a workspace. Appended, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub text: String,
    pub created_at: String,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        let short = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("instr-{}", &short[..12]),
            text: text.into(),
            created_at: now_rfc3339(),
        }
    }
}

/// Structural metadata for one agent invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentNode {
    pub agent_name: String,
    pub level: u32,
    pub parent_id: Option<AgentId>,
    /// Stack depth of the invocation (bottom frame = 0).
    pub depth: usize,
    pub started_at: String,
}

/// Lifecycle status of an agent invocation as recorded in the Context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Running,
    Completed,
    Failed,
    /// The run was cancelled or the process died while the agent was in flight.
    Interrupted,
}

/// The per-workspace context snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub hierarchy: BTreeMap<AgentId, AgentNode>,
    #[serde(default)]
    pub agents_status: BTreeMap<AgentId, AgentRunStatus>,
}

/// File shape of `{key}_context.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextDocument {
    #[serde(default)]
    pub current: Context,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One in-flight agent invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub agent_name: String,
    pub user_input: String,
    pub start_time: String,
}

impl StackFrame {
    pub fn new(agent_name: impl Into<String>, user_input: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            user_input: user_input.into(),
            start_time: now_rfc3339(),
        }
    }

    /// Whether this frame describes the same invocation as `agent_name`/`user_input`.
    pub fn matches(&self, agent_name: &str, user_input: &str) -> bool {
        self.agent_name == agent_name && self.user_input == user_input
    }
}

/// File shape of `{key}_stack.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StackDocument {
    #[serde(default)]
    pub stack: Vec<StackFrame>,
}

/// Answer to "is there an interrupted task to relaunch in this workspace?".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResumeOutcome {
    Found {
        agent_name: String,
        user_input: String,
        interrupted_at: String,
        stack_depth: usize,
    },
    NotFound { message: String },
}

impl ResumeOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ResumeOutcome::Found { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_ids_are_unique() {
        let a = Instruction::new("one");
        let b = Instruction::new("one");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("instr-"));
    }

    #[test]
    fn context_document_tolerates_missing_fields() {
        let doc: ContextDocument = serde_json::from_str(r#"{"current": {}}"#).unwrap();
        assert!(doc.current.instructions.is_empty());
        assert!(doc.updated_at.is_none());
    }

    #[test]
    fn agent_status_serializes_snake_case() {
        let json = serde_json::to_string(&AgentRunStatus::Interrupted).unwrap();
        assert_eq!(json, "\"interrupted\"");
    }

    #[test]
    fn frame_matching_requires_both_fields() {
        let frame = StackFrame::new("alpha_agent", "summarize");
        assert!(frame.matches("alpha_agent", "summarize"));
        assert!(!frame.matches("alpha_agent", "other"));
        assert!(!frame.matches("beta_agent", "summarize"));
    }
}
