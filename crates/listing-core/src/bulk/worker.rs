use std::sync::Arc;

use tracing::{info, warn};

use crate::bulk::storage::TaskStore;
use crate::bulk::types::{BulkCreateResults, BulkTaskStatus, CreatedListing, TaskUpdate};
use crate::listing::NewListing;
use crate::repository::{ListingBatch, ListingBatchSource, StoreError};

/// Progress text published after `done` of `total` items were attempted.
pub fn progress_message(done: usize, total: usize) -> String {
    let pct = if total == 0 { 100.0 } else { done as f64 / total as f64 * 100.0 };
    format!("Processing {done}/{total} listings ({pct:.1}%)")
}

/// Runs one batch of listing inserts and records its progress in a [`TaskStore`].
#[derive(Debug)]
pub struct BulkWorker<S> {
    tasks: TaskStore,
    source: Arc<S>,
}

impl<S: ListingBatchSource> BulkWorker<S> {
    pub fn new(tasks: TaskStore, source: Arc<S>) -> Self {
        Self { tasks, source }
    }

    /// Process `listings` for `task_id` until the task is terminal.
    ///
    /// Never returns an error: item failures end up in the task's `errors`
    /// and batch failures move the task to `failed`.
    pub async fn run(&self, task_id: &str, listings: Vec<NewListing>) {
        let total = listings.len();
        self.tasks
            .update(
                task_id,
                TaskUpdate::message(format!("Processing {total} listings..."))
                    .with_status(BulkTaskStatus::Processing),
            )
            .await;

        match self.process(task_id, &listings).await {
            Ok((created, errors)) => {
                let results = BulkCreateResults {
                    created_count: created.len(),
                    error_count: errors.len(),
                    created_listings: created,
                };
                info!(
                    task_id,
                    created = results.created_count,
                    failed = results.error_count,
                    "bulk create completed"
                );
                let mut update = TaskUpdate::message(format!(
                    "Successfully created {} listings",
                    results.created_count
                ))
                .with_status(BulkTaskStatus::Completed)
                .with_results(results);
                if !errors.is_empty() {
                    update = update.with_errors(errors);
                }
                self.tasks.update(task_id, update).await;
            }
            Err(e) => {
                warn!(task_id, error = %e, "bulk create failed");
                self.fail(task_id, e.to_string()).await;
            }
        }
    }

    /// Move the task to `failed` with a single error entry.
    pub async fn fail(&self, task_id: &str, error: String) {
        self.tasks
            .update(
                task_id,
                TaskUpdate::message(format!("Bulk creation failed: {error}"))
                    .with_status(BulkTaskStatus::Failed)
                    .with_errors(vec![error]),
            )
            .await;
    }

    /// Insert every listing in order inside one batch, then commit it.
    ///
    /// The batch is dropped (rolled back and released) on every early return.
    async fn process(
        &self,
        task_id: &str,
        listings: &[NewListing],
    ) -> Result<(Vec<CreatedListing>, Vec<String>), StoreError> {
        let total = listings.len();
        let mut batch = self.source.begin_batch().await?;

        let mut created = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for (index, listing) in listings.iter().enumerate() {
            match batch.insert(listing).await {
                Ok(id) => created.push(CreatedListing { id, index }),
                Err(e) => {
                    warn!(task_id, index, error = %e, "bulk item rejected");
                    errors.push(format!("Listing {}: {e}", index + 1));
                }
            }
            self.tasks
                .update(task_id, TaskUpdate::message(progress_message(index + 1, total)))
                .await;
        }

        batch.commit().await?;
        Ok((created, errors))
    }
}
