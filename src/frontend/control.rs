//! Stdin control channel for a running task.
//!
//! In JSONL mode each stdin line is a [`ControlCommand`]. In text mode the
//! pending watcher announces new HIL tasks and confirmations on stderr, and each
//! stdin line answers the oldest announced entry that is still waiting.

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::coordination::Coordination;
use crate::coordination::types::HilStatus;
use crate::coordination::watcher::{PendingItem, spawn_pending_watcher};
use crate::error::CoordinationError;

/// One control message from a front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    HilRespond {
        hil_id: String,
        response: String,
    },
    HilCancel {
        hil_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Confirm {
        confirm_id: String,
        approved: bool,
    },
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    pub fn to_line(&self) -> String {
        // Serializing a plain enum of strings and bools cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Resolve the targeted entry. Returns a short description of what happened.
    pub fn apply(&self, coordination: &Coordination) -> Result<String, CoordinationError> {
        match self {
            ControlCommand::HilRespond { hil_id, response } => {
                coordination.hil.respond(hil_id, response)?;
                Ok(format!("HIL task {hil_id} completed"))
            }
            ControlCommand::HilCancel { hil_id, reason } => {
                let reason = reason.as_deref().unwrap_or("cancelled by user");
                coordination.hil.cancel(hil_id, reason)?;
                Ok(format!("HIL task {hil_id} cancelled"))
            }
            ControlCommand::Confirm {
                confirm_id,
                approved,
            } => {
                coordination.gate.respond(confirm_id, *approved)?;
                let verdict = if *approved { "approved" } else { "rejected" };
                Ok(format!("Confirmation {confirm_id} {verdict}"))
            }
        }
    }
}

/// Turn a plain text answer into a command for `item`.
///
/// HIL tasks accept any non-empty line as the response, or `/cancel [reason]`.
/// Confirmations accept `y`/`yes` and `n`/`no`; anything else yields `None`.
pub fn answer_for(item: &PendingItem, line: &str) -> Option<ControlCommand> {
    let line = line.trim();
    match item {
        PendingItem::Hil(task) => {
            if let Some(rest) = line.strip_prefix("/cancel") {
                let reason = rest.trim();
                return Some(ControlCommand::HilCancel {
                    hil_id: task.hil_id.clone(),
                    reason: (!reason.is_empty()).then(|| reason.to_string()),
                });
            }
            (!line.is_empty()).then(|| ControlCommand::HilRespond {
                hil_id: task.hil_id.clone(),
                response: line.to_string(),
            })
        }
        PendingItem::Confirmation(c) => {
            let approved = match line.to_ascii_lowercase().as_str() {
                "y" | "yes" => true,
                "n" | "no" => false,
                _ => return None,
            };
            Some(ControlCommand::Confirm {
                confirm_id: c.confirm_id.clone(),
                approved,
            })
        }
    }
}

/// One-line prompt describing `item`.
pub fn describe(item: &PendingItem) -> String {
    match item {
        PendingItem::Hil(task) => format!(
            "[human] {} (id {}, {}s). Type your reply, or /cancel [reason].",
            task.instruction, task.hil_id, task.timeout_secs
        ),
        PendingItem::Confirmation(c) => format!(
            "[confirm] {} {} -- allow? [y/n]",
            c.tool_name, c.arguments
        ),
    }
}

fn still_waiting(coordination: &Coordination, item: &PendingItem) -> bool {
    match item {
        PendingItem::Hil(task) => coordination
            .hil
            .get_status(&task.hil_id)
            .is_ok_and(|t| t.status == HilStatus::Waiting),
        PendingItem::Confirmation(c) => coordination
            .gate
            .get(&c.confirm_id)
            .is_ok_and(|c| c.approved.is_none()),
    }
}

/// Read control input until `cancel` fires or `input` ends.
///
/// `prompts` receives text-mode prompts and acknowledgements (normally stderr).
pub async fn serve_control<R, W>(
    coordination: Coordination,
    workspace: String,
    input: R,
    mut prompts: W,
    jsonl: bool,
    watch_interval: Duration,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut pending_rx = (!jsonl).then(|| {
        spawn_pending_watcher(
            coordination.clone(),
            workspace.clone(),
            watch_interval,
            cancel.child_token(),
        )
    });
    let mut announced: VecDeque<PendingItem> = VecDeque::new();

    loop {
        let next_pending = async {
            match pending_rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(item) = next_pending => {
                let _ = writeln!(prompts, "{}", describe(&item));
                announced.push_back(item);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read control input: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() && jsonl {
                    continue;
                }

                let command = if jsonl {
                    match ControlCommand::parse(&line) {
                        Ok(command) => Some(command),
                        Err(e) => {
                            tracing::warn!("Ignoring malformed control line: {e}");
                            None
                        }
                    }
                } else {
                    announced.retain(|item| still_waiting(&coordination, item));
                    match announced.front() {
                        Some(item) => {
                            let answer = answer_for(item, &line);
                            if answer.is_none() {
                                let _ = writeln!(prompts, "{}", describe(item));
                            }
                            answer
                        }
                        None => {
                            let _ = writeln!(prompts, "Nothing is waiting for an answer.");
                            None
                        }
                    }
                };

                if let Some(command) = command {
                    match command.apply(&coordination) {
                        Ok(message) => {
                            tracing::info!("{message}");
                            if !jsonl {
                                let _ = writeln!(prompts, "{message}");
                                announced.pop_front();
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Control command failed: {e}");
                            if !jsonl {
                                let _ = writeln!(prompts, "{e}");
                            }
                        }
                    }
                }
            }
        }
    }
}
