//! Result and history records produced by the agent executor.

use serde::{Deserialize, Serialize};

/// Final status of an agent run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// What an agent run returns to its caller (or, for a sub-agent, to its parent
/// as a tool result).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub output: String,
    pub error_information: Option<String>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            output: output.into(),
            error_information: None,
        }
    }

    pub fn error(information: impl Into<String>) -> Self {
        let information = information.into();
        Self {
            status: RunStatus::Error,
            output: String::new(),
            error_information: Some(information),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Whether the run ended because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Error && self.error_information.as_deref() == Some(CANCELLED)
    }
}

/// `error_information` of a run stopped by cancellation.
pub const CANCELLED: &str = "cancelled";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    /// A human (or a confirmation timeout) refused a gated call.
    Rejected,
    /// A human-in-the-loop task timed out.
    Timeout,
    /// A human declined a human-in-the-loop task.
    Cancelled,
}

/// Outcome of one tool call as the model sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            output: output.into(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Error, message)
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Rejected, reason)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Cancelled, message)
    }

    fn failed(status: ToolStatus, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            output: message.clone(),
            error: Some(message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tool,
    SubAgent,
    Human,
}

/// One entry of an agent's action history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub turn: u32,
    pub call_id: String,
    pub tool_name: String,
    pub kind: ActionKind,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
}

/// Turn and nesting budgets for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_turns: u32,
    /// Maximum number of frames on the stack, the top-level frame included.
    pub max_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_depth: 5,
        }
    }
}
