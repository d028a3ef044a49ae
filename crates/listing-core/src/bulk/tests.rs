use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing_test::traced_test;

use crate::bulk::manager::BulkTaskManager;
use crate::bulk::storage::{TaskStore, UpdateOutcome};
use crate::bulk::types::{BulkCreateResults, BulkCreateTask, BulkTaskStatus, CreatedListing, TaskUpdate};
use crate::bulk::worker::progress_message;
use crate::listing::NewListing;
use crate::repository::{ListingBatch, ListingBatchSource, StoreError};

// ── In-memory datastore double ───────────────────────────────────────────────

const UNIQUE_VIOLATION: &str = "UNIQUE constraint failed: listings.landlord_email, listings.name";

#[derive(Default)]
struct Shared {
    committed: Mutex<Vec<(i64, NewListing)>>,
    next_id: AtomicI64,
    open_batches: AtomicUsize,
    unreachable: bool,
    fail_commit: bool,
    insert_delay: Option<Duration>,
    gate: Option<Semaphore>,
}

#[derive(Default, Clone)]
struct MemorySource {
    shared: Arc<Shared>,
}

impl MemorySource {
    fn with(shared: Shared) -> Self {
        Self { shared: Arc::new(shared) }
    }

    fn committed(&self) -> Vec<(i64, NewListing)> {
        self.shared.committed.lock().unwrap().clone()
    }

    fn open_batches(&self) -> usize {
        self.shared.open_batches.load(Ordering::SeqCst)
    }
}

struct MemoryBatch {
    shared: Arc<Shared>,
    staged: Vec<(i64, NewListing)>,
}

impl Drop for MemoryBatch {
    fn drop(&mut self) {
        self.shared.open_batches.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ListingBatchSource for MemorySource {
    type Batch = MemoryBatch;

    async fn begin_batch(&self) -> Result<MemoryBatch, StoreError> {
        if let Some(gate) = &self.shared.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        if self.shared.unreachable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.shared.open_batches.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryBatch { shared: Arc::clone(&self.shared), staged: Vec::new() })
    }
}

impl ListingBatch for MemoryBatch {
    async fn insert(&mut self, listing: &NewListing) -> Result<i64, StoreError> {
        if let Some(delay) = self.shared.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if listing.name == "panic" {
            panic!("listing name triggers a panic");
        }
        let duplicate = {
            let committed = self.shared.committed.lock().unwrap();
            committed
                .iter()
                .chain(self.staged.iter())
                .any(|(_, l)| l.landlord_email == listing.landlord_email && l.name == listing.name)
        };
        if duplicate {
            return Err(StoreError::Rejected(UNIQUE_VIOLATION.into()));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.staged.push((id, listing.clone()));
        Ok(id)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if self.shared.fail_commit {
            return Err(StoreError::Backend("commit aborted".into()));
        }
        let staged = std::mem::take(&mut self.staged);
        self.shared.committed.lock().unwrap().extend(staged);
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn listing(n: usize) -> NewListing {
    NewListing {
        landlord_email: "test@example.com".into(),
        name: format!("Test Bulk Listing {n}"),
        address: format!("{n}00 Test Street"),
        start_date: "2025-12-15T10:00:00".parse().unwrap(),
        end_date: None,
        description: None,
        picture_url: None,
    }
}

fn manager(source: &MemorySource) -> BulkTaskManager<MemorySource> {
    BulkTaskManager::new(TaskStore::new(), Arc::new(source.clone()))
}

async fn wait_terminal(manager: &BulkTaskManager<MemorySource>, task_id: &str) -> BulkCreateTask {
    for _ in 0..1000 {
        let task = manager.get_status(task_id).await.expect("task should exist");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} did not finish in time");
}

fn rank(status: BulkTaskStatus) -> u8 {
    match status {
        BulkTaskStatus::Pending => 0,
        BulkTaskStatus::Processing => 1,
        BulkTaskStatus::Completed | BulkTaskStatus::Failed => 2,
    }
}

// ── Progress text ────────────────────────────────────────────────────────────

#[test]
fn progress_message_uses_one_decimal() {
    assert_eq!(progress_message(1, 3), "Processing 1/3 listings (33.3%)");
    assert_eq!(progress_message(2, 3), "Processing 2/3 listings (66.7%)");
    assert_eq!(progress_message(3, 3), "Processing 3/3 listings (100.0%)");
}

#[test]
fn progress_message_handles_empty_batch() {
    assert_eq!(progress_message(0, 0), "Processing 0/0 listings (100.0%)");
}

// ── State machine ────────────────────────────────────────────────────────────

#[test]
fn only_forward_transitions_are_allowed() {
    use BulkTaskStatus::*;
    assert!(Pending.can_transition_to(Processing));
    assert!(Processing.can_transition_to(Completed));
    assert!(Processing.can_transition_to(Failed));
    assert!(Processing.can_transition_to(Processing));

    assert!(!Pending.can_transition_to(Completed));
    assert!(!Processing.can_transition_to(Pending));
    assert!(!Completed.can_transition_to(Failed));
    assert!(!Failed.can_transition_to(Processing));
    assert!(!Completed.can_transition_to(Completed));
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_value(BulkTaskStatus::Processing).unwrap(), "processing");
    assert_eq!(BulkTaskStatus::Failed.to_string(), "failed");
}

// ── Task store ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_of_missing_task_is_a_noop() {
    let store = TaskStore::new();
    let outcome = store.update("nope", TaskUpdate::message("hello")).await;
    assert_eq!(outcome, UpdateOutcome::Missing);
    assert!(store.get("nope").await.is_none());
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn terminal_task_rejects_further_updates() {
    let store = TaskStore::new();
    store.put("t", BulkCreateTask::pending("t", "queued")).await;
    assert_eq!(
        store
            .update("t", TaskUpdate::message("go").with_status(BulkTaskStatus::Processing))
            .await,
        UpdateOutcome::Applied
    );
    assert_eq!(
        store
            .update("t", TaskUpdate::message("done").with_status(BulkTaskStatus::Completed))
            .await,
        UpdateOutcome::Applied
    );
    let done = store.get("t").await.unwrap();
    assert!(done.completed_at.is_some());

    assert_eq!(store.update("t", TaskUpdate::message("late")).await, UpdateOutcome::Rejected);
    assert_eq!(
        store
            .update("t", TaskUpdate::default().with_status(BulkTaskStatus::Failed))
            .await,
        UpdateOutcome::Rejected
    );
    assert_eq!(store.get("t").await.unwrap(), done);
}

#[tokio::test]
async fn rejected_update_writes_nothing() {
    let store = TaskStore::new();
    store.put("t", BulkCreateTask::pending("t", "queued")).await;
    let outcome = store
        .update(
            "t",
            TaskUpdate::message("skip ahead")
                .with_status(BulkTaskStatus::Completed)
                .with_results(BulkCreateResults::default()),
        )
        .await;
    assert_eq!(outcome, UpdateOutcome::Rejected);
    let task = store.get("t").await.unwrap();
    assert_eq!(task.status, BulkTaskStatus::Pending);
    assert_eq!(task.message, "queued");
    assert!(task.results.is_none());
    assert!(task.completed_at.is_none());
}

#[tokio::test]
async fn put_replaces_existing_record() {
    let store = TaskStore::new();
    store.put("t", BulkCreateTask::pending("t", "first")).await;
    store.put("t", BulkCreateTask::pending("t", "second")).await;
    assert_eq!(store.len().await, 1);
    assert_eq!(store.get("t").await.unwrap().message, "second");
}

#[tokio::test]
async fn readers_never_observe_half_applied_updates() {
    let store = TaskStore::new();
    store.put("t", BulkCreateTask::pending("t", "0")).await;
    store
        .update("t", TaskUpdate::message("0").with_status(BulkTaskStatus::Processing))
        .await;

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for n in 1..=200usize {
                let errors = vec![n.to_string()];
                store
                    .update("t", TaskUpdate::message(n.to_string()).with_errors(errors))
                    .await;
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..200 {
        let task = store.get("t").await.unwrap();
        if let Some(errors) = &task.errors {
            assert_eq!(errors[0], task.message, "message and errors must move together");
        }
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn eviction_only_drops_old_terminal_tasks() {
    let store = TaskStore::new();
    store.put("running", BulkCreateTask::pending("running", "queued")).await;
    store.put("done", BulkCreateTask::pending("done", "queued")).await;
    store
        .update("done", TaskUpdate::message("go").with_status(BulkTaskStatus::Processing))
        .await;
    store
        .update("done", TaskUpdate::message("ok").with_status(BulkTaskStatus::Completed))
        .await;

    assert_eq!(store.evict_finished_before(Utc::now() - chrono::Duration::hours(1)).await, 0);
    assert_eq!(store.evict_finished_before(Utc::now() + chrono::Duration::seconds(1)).await, 1);
    assert!(store.get("done").await.is_none());
    assert!(store.get("running").await.is_some());
}

// ── Batches ──────────────────────────────────────────────────────────────────────

#[tokio::test]
#[traced_test]
async fn all_valid_listings_complete() {
    let source = MemorySource::default();
    let manager = manager(&source);

    let handle = manager.submit_batch(vec![listing(1), listing(2), listing(3)]).await;
    assert_eq!(handle.status, BulkTaskStatus::Pending);
    assert_eq!(handle.message, "Bulk creation of 3 listings queued");

    let task = wait_terminal(&manager, &handle.task_id).await;
    assert_eq!(task.status, BulkTaskStatus::Completed);
    assert_eq!(task.message, "Successfully created 3 listings");
    assert!(task.completed_at.is_some());
    assert!(task.errors.is_none());

    let results = task.results.expect("completed task carries results");
    assert_eq!(results.created_count, 3);
    assert_eq!(results.error_count, 0);
    let indexes: Vec<usize> = results.created_listings.iter().map(|c| c.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(source.committed().len(), 3);
    assert_eq!(source.open_batches(), 0);
    assert!(logs_contain("bulk create completed"));
}

#[tokio::test]
async fn item_failure_is_recorded_and_batch_completes() {
    let source = MemorySource::default();
    let manager = manager(&source);

    let handle = manager.submit_batch(vec![listing(1), listing(1)]).await;
    let task = wait_terminal(&manager, &handle.task_id).await;

    assert_eq!(task.status, BulkTaskStatus::Completed);
    assert_eq!(task.message, "Successfully created 1 listings");
    let results = task.results.unwrap();
    assert_eq!(results.created_count, 1);
    assert_eq!(results.error_count, 1);
    assert_eq!(results.created_listings, vec![CreatedListing { id: 1, index: 0 }]);
    assert_eq!(task.errors, Some(vec![format!("Listing 2: {UNIQUE_VIOLATION}")]));
    assert_eq!(source.committed().len(), 1);
}

#[tokio::test]
async fn unreachable_datastore_fails_the_task() {
    let source = MemorySource::with(Shared { unreachable: true, ..Shared::default() });
    let manager = manager(&source);

    let handle = manager.submit_batch(vec![listing(1), listing(2)]).await;
    let task = wait_terminal(&manager, &handle.task_id).await;

    assert_eq!(task.status, BulkTaskStatus::Failed);
    assert!(task.completed_at.is_some());
    assert!(task.results.is_none());
    let errors = task.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0], "datastore unavailable: connection refused");
    assert_eq!(task.message, "Bulk creation failed: datastore unavailable: connection refused");
    assert!(source.committed().is_empty());
}

#[tokio::test]
async fn failed_commit_leaves_nothing_behind() {
    let source = MemorySource::with(Shared { fail_commit: true, ..Shared::default() });
    let manager = manager(&source);

    let handle = manager.submit_batch(vec![listing(1), listing(2)]).await;
    let task = wait_terminal(&manager, &handle.task_id).await;

    assert_eq!(task.status, BulkTaskStatus::Failed);
    assert!(task.results.is_none());
    assert_eq!(task.errors.unwrap().len(), 1);
    assert!(source.committed().is_empty());
    assert_eq!(source.open_batches(), 0, "connection must be released on failure");
}

#[tokio::test]
async fn empty_batch_completes_with_zero_counts() {
    let source = MemorySource::default();
    let manager = manager(&source);

    let handle = manager.submit_batch(Vec::new()).await;
    assert_eq!(handle.message, "Bulk creation of 0 listings queued");
    let task = wait_terminal(&manager, &handle.task_id).await;

    assert_eq!(task.status, BulkTaskStatus::Completed);
    assert_eq!(task.message, "Successfully created 0 listings");
    let results = task.results.unwrap();
    assert_eq!(results.created_count, 0);
    assert_eq!(results.error_count, 0);
    assert!(results.created_listings.is_empty());
    assert!(task.errors.is_none());
}

#[tokio::test]
async fn repeated_status_reads_are_identical() {
    let source = MemorySource::default();
    let manager = manager(&source);

    let handle = manager.submit_batch(vec![listing(1)]).await;
    wait_terminal(&manager, &handle.task_id).await;

    let first = manager.get_status(&handle.task_id).await;
    let second = manager.get_status(&handle.task_id).await;
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let source = MemorySource::default();
    let manager = manager(&source);
    manager.submit_batch(vec![listing(1)]).await;

    assert!(manager.get_status("does-not-exist").await.is_none());
    assert!(manager.get_status("").await.is_none());
}

#[tokio::test]
async fn submit_returns_before_any_item_is_processed() {
    let source = MemorySource::with(Shared { gate: Some(Semaphore::new(0)), ..Shared::default() });
    let manager = manager(&source);

    let listings: Vec<NewListing> = (1..=500).map(listing).collect();
    let handle = tokio::time::timeout(Duration::from_secs(1), manager.submit_batch(listings))
        .await
        .expect("submit must not wait for the batch");

    let task = manager.get_status(&handle.task_id).await.unwrap();
    assert!(matches!(task.status, BulkTaskStatus::Pending | BulkTaskStatus::Processing));
    assert!(task.completed_at.is_none());
    assert!(task.results.is_none());
    assert!(source.committed().is_empty());

    source.shared.gate.as_ref().unwrap().add_permits(1);
    let task = wait_terminal(&manager, &handle.task_id).await;
    assert_eq!(task.results.unwrap().created_count, 500);
}

#[tokio::test]
async fn observed_progress_only_moves_forward() {
    let source = MemorySource::with(Shared {
        insert_delay: Some(Duration::from_millis(2)),
        ..Shared::default()
    });
    let manager = manager(&source);
    let handle = manager.submit_batch((1..=20).map(listing).collect()).await;

    let mut last_rank = 0;
    let mut last_done = 0;
    loop {
        let task = manager.get_status(&handle.task_id).await.unwrap();
        let r = rank(task.status);
        assert!(r >= last_rank, "status regressed to {}", task.status);
        last_rank = r;

        assert_eq!(task.completed_at.is_some(), task.status.is_terminal());

        if let Some(progress) = task.message.strip_prefix("Processing ") {
            if let Some((done, _)) = progress.split_once('/') {
                let done: usize = done.parse().unwrap();
                assert!(done >= last_done, "progress went backwards");
                last_done = done;
            }
        }
        if task.status.is_terminal() {
            let results = task.results.unwrap();
            assert_eq!(results.created_count + results.error_count, 20);
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn concurrent_batches_are_tracked_independently() {
    let source = MemorySource::default();
    let manager = manager(&source);

    let a = manager.submit_batch((1..=5).map(listing).collect()).await;
    let b = manager.submit_batch((6..=8).map(listing).collect()).await;
    assert_ne!(a.task_id, b.task_id);

    let ta = wait_terminal(&manager, &a.task_id).await;
    let tb = wait_terminal(&manager, &b.task_id).await;
    assert_eq!(ta.results.unwrap().created_count, 5);
    assert_eq!(tb.results.unwrap().created_count, 3);
    assert_eq!(source.committed().len(), 8);
}

#[tokio::test]
async fn worker_panic_marks_task_failed() {
    let source = MemorySource::default();
    let manager = manager(&source);

    let mut bad = listing(1);
    bad.name = "panic".into();
    let handle = manager.submit_batch(vec![bad]).await;
    let task = wait_terminal(&manager, &handle.task_id).await;

    assert_eq!(task.status, BulkTaskStatus::Failed);
    let errors = task.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("listing name triggers a panic"));
    assert!(source.committed().is_empty());
    assert_eq!(source.open_batches(), 0);
}

#[tokio::test]
async fn sweeper_evicts_finished_tasks() {
    let source = MemorySource::default();
    let manager = manager(&source);
    let handle = manager.submit_batch(vec![listing(1)]).await;
    wait_terminal(&manager, &handle.task_id).await;

    let sweeper = manager.spawn_sweeper(Duration::ZERO, Duration::from_millis(5));
    for _ in 0..200 {
        if manager.get_status(&handle.task_id).await.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sweeper.abort();
    assert!(manager.get_status(&handle.task_id).await.is_none());
}
