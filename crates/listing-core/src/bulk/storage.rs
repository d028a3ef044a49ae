use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::bulk::types::{BulkCreateTask, TaskUpdate};

/// Result of [`TaskStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Every field of the update was written.
    Applied,
    /// No task with that id exists; nothing was written.
    Missing,
    /// The task is terminal or the status change was out of order; nothing
    /// was written.
    Rejected,
}

/// Thread-safe, in-memory registry of bulk-create tasks.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so pollers can read snapshots
/// concurrently while workers apply updates. Cloning is cheap and every clone
/// shares the same registry.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, BulkCreateTask>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `task_id`.
    pub async fn put(&self, task_id: impl Into<String>, task: BulkCreateTask) {
        self.inner.write().await.insert(task_id.into(), task);
    }

    /// Return a snapshot of the task, or `None` if it was never stored.
    pub async fn get(&self, task_id: &str) -> Option<BulkCreateTask> {
        self.inner.read().await.get(task_id).cloned()
    }

    /// Apply `update` to the task under a single write lock.
    ///
    /// A missing task is not an error: the worker only updates tasks it was
    /// handed after they were stored, so a miss means the task was evicted.
    pub async fn update(&self, task_id: &str, update: TaskUpdate) -> UpdateOutcome {
        let mut guard = self.inner.write().await;
        let Some(task) = guard.get_mut(task_id) else {
            debug!(task_id, "update for unknown bulk task ignored");
            return UpdateOutcome::Missing;
        };
        let from = task.status;
        let to = update.status;
        if update.apply(task) {
            UpdateOutcome::Applied
        } else {
            warn!(task_id, %from, to = ?to, "out-of-order bulk task update rejected");
            UpdateOutcome::Rejected
        }
    }

    /// Drop terminal tasks that finished before `cutoff`. Returns how many
    /// were removed. Tasks still pending or processing are always kept.
    pub async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, task| match task.completed_at {
            Some(done) => done >= cutoff,
            None => true,
        });
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
