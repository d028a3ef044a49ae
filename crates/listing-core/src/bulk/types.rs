use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;

/// Lifecycle state of a bulk-create task.
///
/// Transitions only move forward: `pending → processing → completed | failed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BulkTaskStatus {
    /// Accepted; the worker has not started yet.
    Pending,
    /// The worker is iterating over the batch.
    Processing,
    /// Every item was attempted and the batch was committed.
    Completed,
    /// The batch aborted before any item could be committed.
    Failed,
}

impl BulkTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BulkTaskStatus::Completed | BulkTaskStatus::Failed)
    }

    /// Whether a record in state `self` may be moved to `next`.
    ///
    /// Re-asserting a non-terminal state is allowed so progress updates can
    /// carry the status they were issued under.
    pub fn can_transition_to(self, next: BulkTaskStatus) -> bool {
        use BulkTaskStatus::*;
        match (self, next) {
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) => true,
            (from, to) => from == to && !from.is_terminal(),
        }
    }
}

/// A successfully inserted item and its position in the submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatedListing {
    pub id: i64,
    pub index: usize,
}

/// Aggregated outcome of a completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkCreateResults {
    pub created_count: usize,
    pub error_count: usize,
    pub created_listings: Vec<CreatedListing>,
}

/// Snapshot of one bulk-create task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BulkCreateTask {
    pub task_id: String,
    pub status: BulkTaskStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BulkCreateResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl BulkCreateTask {
    /// A freshly submitted task.
    pub fn pending(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: BulkTaskStatus::Pending,
            message: message.into(),
            created_at: Utc::now(),
            completed_at: None,
            results: None,
            errors: None,
        }
    }
}

/// A set of field assignments applied atomically by [`TaskStore::update`].
///
/// `completed_at` is not assignable: it is stamped when the status first
/// becomes terminal.
///
/// [`TaskStore::update`]: crate::TaskStore::update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<BulkTaskStatus>,
    pub message: Option<String>,
    pub results: Option<BulkCreateResults>,
    pub errors: Option<Vec<String>>,
}

impl TaskUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::default() }
    }

    pub fn with_status(mut self, status: BulkTaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_results(mut self, results: BulkCreateResults) -> Self {
        self.results = Some(results);
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Apply to `task`, or leave it untouched and return `false` when the task
    /// is already terminal or the status change would move it backwards.
    pub(crate) fn apply(self, task: &mut BulkCreateTask) -> bool {
        if task.status.is_terminal() {
            return false;
        }
        if let Some(next) = self.status {
            if !task.status.can_transition_to(next) {
                return false;
            }
            if next.is_terminal() {
                task.completed_at = Some(Utc::now());
            }
            task.status = next;
        }
        if let Some(message) = self.message {
            task.message = message;
        }
        if let Some(results) = self.results {
            task.results = Some(results);
        }
        if let Some(errors) = self.errors {
            task.errors = Some(errors);
        }
        true
    }
}
