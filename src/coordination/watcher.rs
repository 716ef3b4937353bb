//! Polling actor that surfaces new pending entries to a front end.
//!
//! The watcher scans one workspace every `interval` and sends each newly seen
//! waiting HIL task or tool confirmation exactly once. It stops when its
//! cancellation token fires or the receiver is dropped. Ids stop being
//! tracked once their entry is no longer waiting.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Coordination;
use super::types::{HilStatus, HilTask, ToolConfirmation};

/// A pending entry waiting for a human.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingItem {
    Hil(HilTask),
    Confirmation(ToolConfirmation),
}

impl PendingItem {
    pub fn id(&self) -> &str {
        match self {
            PendingItem::Hil(t) => &t.hil_id,
            PendingItem::Confirmation(c) => &c.confirm_id,
        }
    }
}

/// Ids already sent to the front end that are still waiting.
#[derive(Debug, Default)]
struct Announced {
    ids: HashSet<String>,
}

impl Announced {
    /// Return the items not announced before and forget ids that are no
    /// longer in `waiting`.
    fn fresh(&mut self, waiting: Vec<PendingItem>) -> Vec<PendingItem> {
        let current: HashSet<&str> = waiting.iter().map(PendingItem::id).collect();
        self.ids.retain(|id| current.contains(id.as_str()));
        waiting
            .into_iter()
            .filter(|item| self.ids.insert(item.id().to_string()))
            .collect()
    }
}

pub fn spawn_pending_watcher(
    coordination: Coordination,
    workspace: String,
    interval: Duration,
    cancel: CancellationToken,
) -> mpsc::UnboundedReceiver<PendingItem> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut announced = Announced::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let waiting: Vec<PendingItem> = coordination
                .hil
                .list(&workspace)
                .into_iter()
                .filter(|t| t.status == HilStatus::Waiting)
                .map(PendingItem::Hil)
                .chain(
                    coordination
                        .gate
                        .list(&workspace)
                        .into_iter()
                        .filter(|c| c.approved.is_none())
                        .map(PendingItem::Confirmation),
                )
                .collect();

            for item in announced.fresh(waiting) {
                if tx.send(item).is_err() {
                    tracing::debug!(workspace = %workspace, "Pending watcher receiver dropped");
                    return;
                }
            }
        }
        tracing::debug!(workspace = %workspace, "Pending watcher stopped");
    });

    rx
}
