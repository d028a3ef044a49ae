//! Bulk-create batches backed by a single sqlx transaction.
//!
//! Each insert runs inside its own savepoint so a rejected row is rolled back
//! on its own and the outer transaction stays usable for the rest of the batch.

use listing_core::{ListingBatch, ListingBatchSource, NewListing, StoreError};
use sqlx::{Any, Connection, Transaction};
use tracing::warn;

use crate::entities::listing::insert_listing_row;
use crate::entities::AnyStore;

/// An open transaction; dropping it without [`ListingBatch::commit`] rolls
/// back every staged insert.
pub struct AnyListingBatch {
    tx: Transaction<'static, Any>,
}

impl ListingBatchSource for AnyStore {
    type Batch = AnyListingBatch;

    async fn begin_batch(&self) -> Result<AnyListingBatch, StoreError> {
        let tx = self.pool.begin().await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(AnyListingBatch { tx })
    }
}

impl ListingBatch for AnyListingBatch {
    async fn insert(&mut self, listing: &NewListing) -> Result<i64, StoreError> {
        let mut savepoint = Connection::begin(&mut *self.tx).await.map_err(classify)?;
        match insert_listing_row(&mut savepoint, listing).await {
            Ok(id) => {
                savepoint.commit().await.map_err(classify)?;
                Ok(id)
            }
            Err(e) => {
                if let Err(rb) = savepoint.rollback().await {
                    warn!(error = %rb, "failed to roll back listing savepoint");
                }
                Err(classify(e))
            }
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(classify)
    }
}

fn classify(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_owned()),
        gone @ (sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => {
            StoreError::Unavailable(gone.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pool_failures_are_unavailable() {
        assert!(matches!(classify(sqlx::Error::PoolClosed), StoreError::Unavailable(_)));
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), StoreError::Unavailable(_)));
        assert!(matches!(classify(sqlx::Error::RowNotFound), StoreError::Backend(_)));
    }
}
