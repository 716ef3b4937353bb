//! Human-in-the-loop task coordination.
//!
//! A running agent calls [`HilCoordinator::request`] (or `create` followed by
//! `wait`) and is suspended until a front end answers through `complete`,
//! `respond` or `cancel`, the task's timeout elapses, or the run is cancelled.
//! The timeout runs from `create`: a task nobody waits on still times out.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::pending::{PendingRegistry, WaitOutcome};
use super::types::{HilStatus, HilTask};
use crate::error::CoordinationError;

/// What the requesting agent learns once a HIL wait ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HilOutcome {
    /// The human finished the task; carries their response.
    Completed(String),
    /// The human declined; carries the reason.
    Cancelled(String),
    TimedOut,
    /// The enclosing run was cancelled while waiting.
    Aborted,
}

#[derive(Clone)]
pub struct HilCoordinator {
    tasks: PendingRegistry<HilTask>,
    poll_interval: Duration,
}

impl HilCoordinator {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            tasks: PendingRegistry::new(),
            poll_interval,
        }
    }

    /// Register a waiting task. A fresh id is generated when `hil_id` is `None`.
    pub fn create(
        &self,
        workspace: &str,
        hil_id: Option<String>,
        instruction: &str,
        timeout: Duration,
    ) -> Result<HilTask, CoordinationError> {
        let hil_id = hil_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("hil-{}", Uuid::new_v4().simple()));
        let task = self.tasks.insert(
            HilTask::new(hil_id, workspace, instruction, timeout.as_secs()),
            Some(Instant::now() + timeout),
        )?;
        tracing::info!(hil_id = %task.hil_id, workspace, timeout_secs = task.timeout_secs, "HIL task created");
        Ok(task)
    }

    /// Block until the task leaves `waiting` or its deadline passes.
    pub async fn wait(
        &self,
        hil_id: &str,
        cancel: &CancellationToken,
    ) -> Result<HilOutcome, CoordinationError> {
        let outcome = self.tasks.wait(hil_id, self.poll_interval, cancel).await?;
        Ok(match outcome {
            WaitOutcome::Resolved(task) => match task.status {
                HilStatus::Completed => HilOutcome::Completed(task.result.unwrap_or_default()),
                HilStatus::Cancelled => HilOutcome::Cancelled(task.result.unwrap_or_default()),
                HilStatus::Timeout | HilStatus::Waiting => HilOutcome::TimedOut,
            },
            WaitOutcome::TimedOut(_) => HilOutcome::TimedOut,
            WaitOutcome::Aborted(_) => HilOutcome::Aborted,
        })
    }

    /// Create a task and wait for it.
    pub async fn request(
        &self,
        workspace: &str,
        hil_id: Option<String>,
        instruction: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(HilTask, HilOutcome), CoordinationError> {
        let task = self.create(workspace, hil_id, instruction, timeout)?;
        let outcome = self.wait(&task.hil_id, cancel).await?;
        Ok((task, outcome))
    }

    pub fn complete(&self, hil_id: &str, result: &str) -> Result<HilTask, CoordinationError> {
        let task = self.tasks.resolve(hil_id, |t| {
            t.status = HilStatus::Completed;
            t.result = Some(result.to_string());
        })?;
        tracing::info!(hil_id, "HIL task completed");
        Ok(task)
    }

    /// Answer a task; equivalent to [`complete`](Self::complete).
    pub fn respond(&self, hil_id: &str, response: &str) -> Result<HilTask, CoordinationError> {
        self.complete(hil_id, response)
    }

    pub fn cancel(&self, hil_id: &str, reason: &str) -> Result<HilTask, CoordinationError> {
        let task = self.tasks.resolve(hil_id, |t| {
            t.status = HilStatus::Cancelled;
            t.result = Some(reason.to_string());
        })?;
        tracing::info!(hil_id, reason, "HIL task cancelled");
        Ok(task)
    }

    pub fn get_status(&self, hil_id: &str) -> Result<HilTask, CoordinationError> {
        self.tasks
            .get(hil_id)
            .ok_or_else(|| CoordinationError::NotFound(hil_id.to_string()))
    }

    pub fn list(&self, workspace: &str) -> Vec<HilTask> {
        self.tasks.list(workspace)
    }

    pub fn list_all(&self) -> Vec<HilTask> {
        self.tasks.list_all()
    }

    pub fn first_waiting(&self, workspace: &str) -> Option<HilTask> {
        self.tasks.first_waiting(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_used_when_none_given() {
        let hil = HilCoordinator::new(Duration::from_millis(100));
        let a = hil.create("ws", None, "one", Duration::from_secs(5)).unwrap();
        let b = hil.create("ws", Some("   ".into()), "two", Duration::from_secs(5)).unwrap();
        assert!(a.hil_id.starts_with("hil-"));
        assert_ne!(a.hil_id, b.hil_id);
    }

    #[test]
    fn cancel_records_reason() {
        let hil = HilCoordinator::new(Duration::from_millis(100));
        hil.create("ws", Some("h1".into()), "sign", Duration::from_secs(5)).unwrap();
        let task = hil.cancel("h1", "not today").unwrap();
        assert_eq!(task.status, HilStatus::Cancelled);
        assert_eq!(task.result.as_deref(), Some("not today"));
    }

    #[tokio::test]
    async fn request_returns_human_response() {
        let hil = HilCoordinator::new(Duration::from_millis(10));
        let cancel = CancellationToken::new();

        let responder = {
            let hil = hil.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(task) = hil.first_waiting("ws") {
                        hil.respond(&task.hil_id, "uploaded").unwrap();
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let (_, outcome) = hil
            .request("ws", None, "upload the file", Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        responder.await.unwrap();
        assert_eq!(outcome, HilOutcome::Completed("uploaded".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn unattended_task_times_out_from_creation() {
        let hil = HilCoordinator::new(Duration::from_millis(100));
        let task = hil
            .create("ws", Some("h1".into()), "upload", Duration::from_secs(5))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(hil.get_status(&task.hil_id).unwrap().status, HilStatus::Timeout);
        assert_eq!(
            hil.respond(&task.hil_id, "late").unwrap_err(),
            CoordinationError::AlreadyResolved {
                id: "h1".into(),
                status: "timeout".into()
            }
        );
        let outcome = hil.wait(&task.hil_id, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, HilOutcome::TimedOut);
    }
}
