//! Generic registry of entries that a waiter blocks on until someone else
//! resolves them.
//!
//! **Concurrency model:** entries live in an `Arc<Mutex<HashMap>>` like every
//! other registry in the crate; a shared [`Notify`] wakes waiters whenever any
//! entry changes. Waiters also re-check on a fixed poll interval, so a missed
//! wake-up costs at most one interval.
//!
//! Every entry leaves the waiting state exactly once. Resolution, timeout and
//! withdrawal all go through the same check-and-set under the lock, so
//! whichever happens first wins and the others become no-ops.
//!
//! Deadlines are fixed at insert. An overdue entry is expired the next time
//! anyone looks at the registry, whether or not a waiter is parked on it.
//! Settled entries are dropped once they have been settled for longer than
//! the retention window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::PendingEntry;
use crate::error::CoordinationError;

/// How long a settled entry stays queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// How a [`PendingRegistry::wait`] ended. Each variant carries the final entry.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    /// Someone else resolved the entry.
    Resolved(T),
    /// The deadline passed first; the entry is now in its timed-out state.
    TimedOut(T),
    /// The waiter was cancelled first; the entry has been withdrawn.
    Aborted(T),
}

struct Slot<T> {
    seq: u64,
    entry: T,
    deadline: Option<Instant>,
    settled_at: Option<Instant>,
}

impl<T: PendingEntry> Slot<T> {
    /// Apply `change` if still waiting. Returns whether anything changed.
    fn settle(&mut self, now: Instant, change: impl FnOnce(&mut T)) -> bool {
        if !self.entry.is_waiting() {
            return false;
        }
        change(&mut self.entry);
        self.settled_at = Some(now);
        true
    }
}

struct Entries<T> {
    slots: HashMap<String, Slot<T>>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct PendingRegistry<T> {
    entries: Arc<Mutex<Entries<T>>>,
    notify: Arc<Notify>,
    retention: Duration,
}

impl<T: PendingEntry> Default for PendingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PendingEntry> PendingRegistry<T> {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                slots: HashMap::new(),
                next_seq: 0,
            })),
            notify: Arc::new(Notify::new()),
            retention,
        }
    }

    /// Register a new entry that times out at `deadline` (never when `None`).
    /// It is visible to `get`/`list` immediately.
    pub fn insert(&self, entry: T, deadline: Option<Instant>) -> Result<T, CoordinationError> {
        let mut entries = self.current();
        if entries.slots.contains_key(entry.id()) {
            return Err(CoordinationError::Duplicate(entry.id().to_string()));
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.slots.insert(
            entry.id().to_string(),
            Slot {
                seq,
                entry: entry.clone(),
                deadline,
                settled_at: None,
            },
        );
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.current().slots.get(id).map(|slot| slot.entry.clone())
    }

    /// Entries for one workspace, oldest first.
    pub fn list(&self, workspace: &str) -> Vec<T> {
        self.collect(|entry| entry.workspace() == workspace)
    }

    /// All entries, oldest first.
    pub fn list_all(&self) -> Vec<T> {
        self.collect(|_| true)
    }

    /// Oldest entry in `workspace` that is still waiting.
    pub fn first_waiting(&self, workspace: &str) -> Option<T> {
        self.collect(|entry| entry.workspace() == workspace && entry.is_waiting())
            .into_iter()
            .next()
    }

    /// Apply `apply` to a waiting entry and wake waiters.
    ///
    /// Fails with `NotFound` for an unknown id and `AlreadyResolved` when the
    /// entry has left the waiting state (including by passing its deadline);
    /// neither case changes anything.
    pub fn resolve(&self, id: &str, apply: impl FnOnce(&mut T)) -> Result<T, CoordinationError> {
        let resolved = {
            let mut entries = self.current();
            let slot = entries
                .slots
                .get_mut(id)
                .ok_or_else(|| CoordinationError::NotFound(id.to_string()))?;
            if !slot.settle(Instant::now(), apply) {
                return Err(CoordinationError::AlreadyResolved {
                    id: id.to_string(),
                    status: slot.entry.status_label().to_string(),
                });
            }
            slot.entry.clone()
        };
        self.notify.notify_waiters();
        Ok(resolved)
    }

    /// Block until `id` is resolved, its deadline passes, or `cancel` fires.
    pub async fn wait(
        &self,
        id: &str,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome<T>, CoordinationError> {
        loop {
            // -- Arm the notification before checking so a resolve between the
            //    check and the select cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (current, deadline) = {
                let entries = self.lock();
                let slot = entries
                    .slots
                    .get(id)
                    .ok_or_else(|| CoordinationError::NotFound(id.to_string()))?;
                (slot.entry.clone(), slot.deadline)
            };
            if !current.is_waiting() {
                return Ok(WaitOutcome::Resolved(current));
            }
            if deadline.is_some_and(|d| d <= Instant::now()) {
                return self.expire(id);
            }

            let until_deadline = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    let (changed, entry) = self.settle_if_waiting(id, |e| e.withdraw("run cancelled"))?;
                    return Ok(if changed { WaitOutcome::Aborted(entry) } else { WaitOutcome::Resolved(entry) });
                }
                _ = until_deadline => return self.expire(id),
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    fn expire(&self, id: &str) -> Result<WaitOutcome<T>, CoordinationError> {
        let (changed, entry) = self.settle_if_waiting(id, |e| e.expire())?;
        if changed {
            tracing::info!(id, "Pending entry timed out");
        }
        Ok(if changed { WaitOutcome::TimedOut(entry) } else { WaitOutcome::Resolved(entry) })
    }

    fn settle_if_waiting(
        &self,
        id: &str,
        apply: impl FnOnce(&mut T),
    ) -> Result<(bool, T), CoordinationError> {
        let outcome = {
            let mut entries = self.lock();
            let slot = entries
                .slots
                .get_mut(id)
                .ok_or_else(|| CoordinationError::NotFound(id.to_string()))?;
            let changed = slot.settle(Instant::now(), apply);
            (changed, slot.entry.clone())
        };
        if outcome.0 {
            self.notify.notify_waiters();
        }
        Ok(outcome)
    }

    fn collect(&self, keep: impl Fn(&T) -> bool) -> Vec<T> {
        let entries = self.current();
        let mut matching: Vec<(u64, T)> = entries
            .slots
            .values()
            .filter(|slot| keep(&slot.entry))
            .map(|slot| (slot.seq, slot.entry.clone()))
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        matching.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Lock, expire overdue entries, and drop entries past retention.
    fn current(&self) -> MutexGuard<'_, Entries<T>> {
        let now = Instant::now();
        let mut entries = self.lock();

        let mut expired = 0;
        for slot in entries.slots.values_mut() {
            if slot.deadline.is_some_and(|d| d <= now) && slot.settle(now, |e| e.expire()) {
                tracing::info!(id = %slot.entry.id(), "Pending entry timed out");
                expired += 1;
            }
        }

        let retention = self.retention;
        entries
            .slots
            .retain(|_, slot| slot.settled_at.is_none_or(|at| now.duration_since(at) < retention));

        if expired > 0 {
            self.notify.notify_waiters();
        }
        entries
    }

    fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
