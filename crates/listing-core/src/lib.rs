//! listing-core – listing payloads and the asynchronous bulk-create subsystem.
//!
//! The HTTP layer only touches [`BulkTaskManager`]; persistence is reached
//! through the [`ListingBatchSource`] seam so any datastore can back a batch.

mod bulk;
mod listing;
mod repository;

pub use bulk::manager::{BulkTaskHandle, BulkTaskManager};
pub use bulk::storage::{TaskStore, UpdateOutcome};
pub use bulk::types::{BulkCreateResults, BulkCreateTask, BulkTaskStatus, CreatedListing, TaskUpdate};
pub use bulk::worker::{progress_message, BulkWorker};
pub use listing::{validate_availability_window, BulkListingCreate, NewListing, BULK_LIMIT, DATETIME_FORMAT};
pub use repository::{ListingBatch, ListingBatchSource, StoreError};
