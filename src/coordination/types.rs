//! Records shared between a blocked execution and whoever answers it.

use serde::{Deserialize, Serialize};

use crate::orchestration::types::now_rfc3339;

/// Lifecycle of a human-in-the-loop task. Leaves `Waiting` exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HilStatus {
    Waiting,
    Completed,
    Cancelled,
    Timeout,
}

impl HilStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HilStatus::Waiting => "waiting",
            HilStatus::Completed => "completed",
            HilStatus::Cancelled => "cancelled",
            HilStatus::Timeout => "timeout",
        }
    }
}

/// A request for a human to do something and report back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HilTask {
    pub hil_id: String,
    pub status: HilStatus,
    pub instruction: String,
    /// Workspace key the requesting run is bound to.
    pub workspace: String,
    /// Human response on completion, reason on cancellation.
    pub result: Option<String>,
    pub timeout_secs: u64,
    pub created_at: String,
}

impl HilTask {
    pub fn new(
        hil_id: impl Into<String>,
        workspace: impl Into<String>,
        instruction: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            hil_id: hil_id.into(),
            status: HilStatus::Waiting,
            instruction: instruction.into(),
            workspace: workspace.into(),
            result: None,
            timeout_secs,
            created_at: now_rfc3339(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Waiting,
    Approved,
    Rejected,
    Timeout,
    /// Withdrawn because the requesting run was cancelled.
    Cancelled,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Waiting => "waiting",
            ConfirmationStatus::Approved => "approved",
            ConfirmationStatus::Rejected => "rejected",
            ConfirmationStatus::Timeout => "timeout",
            ConfirmationStatus::Cancelled => "cancelled",
        }
    }
}

/// A request to approve one mutating tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolConfirmation {
    pub confirm_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// `None` while waiting; `Some(true)` only when approved.
    pub approved: Option<bool>,
    pub status: ConfirmationStatus,
    pub workspace: String,
    pub created_at: String,
}

impl ToolConfirmation {
    pub fn new(
        confirm_id: impl Into<String>,
        workspace: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            confirm_id: confirm_id.into(),
            tool_name: tool_name.into(),
            arguments,
            approved: None,
            status: ConfirmationStatus::Waiting,
            workspace: workspace.into(),
            created_at: now_rfc3339(),
        }
    }

    pub(crate) fn settle(&mut self, status: ConfirmationStatus) {
        self.approved = Some(status == ConfirmationStatus::Approved);
        self.status = status;
    }
}

/// Common view over pending entries used by [`super::pending::PendingRegistry`].
pub trait PendingEntry: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn workspace(&self) -> &str;
    fn is_waiting(&self) -> bool;
    fn status_label(&self) -> &'static str;
    /// Transition to the timed-out state.
    fn expire(&mut self);
    /// Transition to the cancelled state because the waiter went away.
    fn withdraw(&mut self, reason: &str);
}

impl PendingEntry for HilTask {
    fn id(&self) -> &str {
        &self.hil_id
    }

    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn is_waiting(&self) -> bool {
        self.status == HilStatus::Waiting
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn expire(&mut self) {
        self.status = HilStatus::Timeout;
    }

    fn withdraw(&mut self, reason: &str) {
        self.status = HilStatus::Cancelled;
        self.result = Some(reason.to_string());
    }
}

impl PendingEntry for ToolConfirmation {
    fn id(&self) -> &str {
        &self.confirm_id
    }

    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn is_waiting(&self) -> bool {
        self.status == ConfirmationStatus::Waiting
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn expire(&mut self) {
        self.settle(ConfirmationStatus::Timeout);
    }

    fn withdraw(&mut self, _reason: &str) {
        self.settle(ConfirmationStatus::Cancelled);
    }
}
