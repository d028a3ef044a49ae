//! Submission and polling surface for bulk-create tasks.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::bulk::storage::TaskStore;
use crate::bulk::types::{BulkCreateTask, BulkTaskStatus};
use crate::bulk::worker::BulkWorker;
use crate::listing::NewListing;
use crate::repository::ListingBatchSource;

/// What a caller gets back from [`BulkTaskManager::submit_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BulkTaskHandle {
    pub task_id: String,
    pub status: BulkTaskStatus,
    pub message: String,
}

/// Owns the task registry and schedules batch workers on the tokio runtime.
#[derive(Debug)]
pub struct BulkTaskManager<S> {
    tasks: TaskStore,
    worker: Arc<BulkWorker<S>>,
}

impl<S> Clone for BulkTaskManager<S> {
    fn clone(&self) -> Self {
        Self { tasks: self.tasks.clone(), worker: Arc::clone(&self.worker) }
    }
}

impl<S: ListingBatchSource> BulkTaskManager<S> {
    pub fn new(tasks: TaskStore, source: Arc<S>) -> Self {
        let worker = Arc::new(BulkWorker::new(tasks.clone(), source));
        Self { tasks, worker }
    }

    /// Register a pending task and hand the batch to a detached worker.
    ///
    /// Returns as soon as the task is stored; no listing is touched here.
    pub async fn submit_batch(&self, listings: Vec<NewListing>) -> BulkTaskHandle {
        let task_id = Uuid::new_v4().to_string();
        let message = format!("Bulk creation of {} listings queued", listings.len());
        self.tasks
            .put(task_id.clone(), BulkCreateTask::pending(task_id.clone(), message.clone()))
            .await;
        info!(task_id = %task_id, count = listings.len(), "bulk create queued");

        let worker = Arc::clone(&self.worker);
        let tid = task_id.clone();
        let span = info_span!("bulk_create", task_id = %task_id);
        tokio::spawn(
            async move {
                let run = AssertUnwindSafe(worker.run(&tid, listings)).catch_unwind().await;
                if let Err(panic) = run {
                    let reason = panic_reason(panic.as_ref());
                    error!(task_id = %tid, reason = %reason, "bulk worker panicked");
                    worker.fail(&tid, format!("worker panicked: {reason}")).await;
                }
            }
            .instrument(span),
        );

        BulkTaskHandle { task_id, status: BulkTaskStatus::Pending, message }
    }

    /// Current snapshot of a task, or `None` if no such task was submitted
    /// (or it has since been evicted).
    pub async fn get_status(&self, task_id: &str) -> Option<BulkCreateTask> {
        self.tasks.get(task_id).await
    }

    /// Periodically evict terminal tasks older than `ttl`.
    pub fn spawn_sweeper(&self, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let tasks = self.tasks.clone();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let cutoff = Utc::now()
                    .checked_sub_signed(ttl)
                    .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
                let evicted = tasks.evict_finished_before(cutoff).await;
                if evicted > 0 {
                    let remaining = tasks.len().await;
                    info!(evicted, remaining, "expired bulk tasks evicted");
                }
            }
        })
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
