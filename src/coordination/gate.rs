//! Permission gate for mutating tool calls.
//!
//! Each workspace runs in either auto mode (everything allowed) or manual mode,
//! where the executor opens a [`ToolConfirmation`] and suspends until a human
//! approves or rejects it. An unanswered confirmation times out and counts as a
//! rejection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::pending::{PendingRegistry, WaitOutcome};
use super::types::{ConfirmationStatus, ToolConfirmation};
use crate::error::CoordinationError;

/// Verdict for one gated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Rejected { reason: String },
    TimedOut,
    /// The enclosing run was cancelled while waiting.
    Aborted,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

#[derive(Clone)]
pub struct PermissionGate {
    confirmations: PendingRegistry<ToolConfirmation>,
    /// Per-workspace auto-mode flag. Missing key -> `default_auto`.
    modes: Arc<Mutex<HashMap<String, bool>>>,
    default_auto: bool,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

impl PermissionGate {
    pub fn new(default_auto: bool, poll_interval: Duration, confirm_timeout: Duration) -> Self {
        Self {
            confirmations: PendingRegistry::new(),
            modes: Arc::new(Mutex::new(HashMap::new())),
            default_auto,
            poll_interval,
            confirm_timeout,
        }
    }

    /// Set the permission mode for a workspace's task. Takes effect for the
    /// next gated call.
    pub fn set_task_permission(&self, workspace: &str, auto: bool) {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(workspace.to_string(), auto);
        tracing::info!(workspace, auto_mode = auto, "Task permission set");
    }

    pub fn is_auto(&self, workspace: &str) -> bool {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(workspace)
            .copied()
            .unwrap_or(self.default_auto)
    }

    pub fn confirm_timeout(&self) -> Duration {
        self.confirm_timeout
    }

    /// Register a waiting confirmation for `tool_name`.
    pub fn open(
        &self,
        workspace: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<ToolConfirmation, CoordinationError> {
        let confirm_id = format!("confirm-{}", Uuid::new_v4().simple());
        let confirmation = self.confirmations.insert(
            ToolConfirmation::new(confirm_id, workspace, tool_name, arguments.clone()),
            Some(Instant::now() + self.confirm_timeout),
        )?;
        tracing::info!(confirm_id = %confirmation.confirm_id, tool = tool_name, workspace, "Awaiting tool confirmation");
        Ok(confirmation)
    }

    /// Block until the confirmation is answered or `cancel` fires. The timeout
    /// counts from `open`.
    pub async fn wait(
        &self,
        confirm_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GateDecision, CoordinationError> {
        let outcome = self
            .confirmations
            .wait(confirm_id, self.poll_interval, cancel)
            .await?;
        Ok(match outcome {
            WaitOutcome::Resolved(c) => match c.status {
                ConfirmationStatus::Approved => GateDecision::Allowed,
                ConfirmationStatus::Rejected => GateDecision::Rejected {
                    reason: format!("User rejected {}", c.tool_name),
                },
                ConfirmationStatus::Cancelled => GateDecision::Aborted,
                ConfirmationStatus::Timeout | ConfirmationStatus::Waiting => GateDecision::TimedOut,
            },
            WaitOutcome::TimedOut(_) => GateDecision::TimedOut,
            WaitOutcome::Aborted(_) => GateDecision::Aborted,
        })
    }

    /// Gate one mutating call: allowed at once in auto mode, otherwise open a
    /// confirmation and wait for it.
    pub async fn check(
        &self,
        workspace: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<GateDecision, CoordinationError> {
        if self.is_auto(workspace) {
            return Ok(GateDecision::Allowed);
        }
        let confirmation = self.open(workspace, tool_name, arguments)?;
        self.wait(&confirmation.confirm_id, cancel).await
    }

    pub fn approve(&self, confirm_id: &str) -> Result<ToolConfirmation, CoordinationError> {
        self.respond(confirm_id, true)
    }

    pub fn reject(&self, confirm_id: &str) -> Result<ToolConfirmation, CoordinationError> {
        self.respond(confirm_id, false)
    }

    pub fn respond(&self, confirm_id: &str, approved: bool) -> Result<ToolConfirmation, CoordinationError> {
        let status = if approved {
            ConfirmationStatus::Approved
        } else {
            ConfirmationStatus::Rejected
        };
        let confirmation = self.confirmations.resolve(confirm_id, |c| c.settle(status))?;
        tracing::info!(confirm_id, approved, "Tool confirmation answered");
        Ok(confirmation)
    }

    pub fn get(&self, confirm_id: &str) -> Result<ToolConfirmation, CoordinationError> {
        self.confirmations
            .get(confirm_id)
            .ok_or_else(|| CoordinationError::NotFound(confirm_id.to_string()))
    }

    pub fn list(&self, workspace: &str) -> Vec<ToolConfirmation> {
        self.confirmations.list(workspace)
    }

    pub fn first_waiting(&self, workspace: &str) -> Option<ToolConfirmation> {
        self.confirmations.first_waiting(workspace)
    }
}
