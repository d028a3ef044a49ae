//! Datastore seam used by the bulk worker.
//!
//! A [`ListingBatchSource`] hands out one [`ListingBatch`] per bulk task. The
//! batch owns its connection for the whole run: inserts are staged inside it,
//! [`ListingBatch::commit`] makes them durable as a unit, and dropping an
//! uncommitted batch discards every staged insert and releases the connection.
//!
//! Trait methods use `impl Future` in their signatures so no `async-trait`
//! crate is required.

use std::future::Future;

use thiserror::Error;

use crate::listing::NewListing;

/// Failures reported by a datastore implementation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The datastore could not be reached or no connection could be acquired.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    /// The datastore refused a single record (constraint violation, bad value).
    #[error("{0}")]
    Rejected(String),

    /// Any other datastore failure.
    #[error("datastore error: {0}")]
    Backend(String),
}

/// Opens batches against a datastore.
pub trait ListingBatchSource: Send + Sync + 'static {
    type Batch: ListingBatch;

    /// Acquire a connection and open a unit of work.
    fn begin_batch(&self) -> impl Future<Output = Result<Self::Batch, StoreError>> + Send;
}

/// One open unit of work holding a datastore connection.
pub trait ListingBatch: Send {
    /// Stage a single insert and return the id the datastore assigned.
    fn insert(
        &mut self,
        listing: &NewListing,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Make every staged insert durable and release the connection.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
