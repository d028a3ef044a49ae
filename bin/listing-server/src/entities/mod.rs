//! Database abstraction layer.
//!
//! [`ListingStore`] defines the listing CRUD interface and [`AnyStore`]
//! implements it on top of a pooled `sqlx::Any` connection, so the backing
//! database is chosen by URL. [`AnyStore`] is also the
//! [`listing_core::ListingBatchSource`] the bulk worker writes through.
//!
//! All trait methods use `impl Future` in their signatures (stable since Rust
//! 1.75) so no extra `async-trait` crate is required.

pub mod bulk;
pub mod dao;
pub mod listing;

pub use dao::{ListingFilter, ListingPatch, ListingRecord, ListingSort, ListingSortField};

pub use listing::ListingStore;

use std::str::FromStr;

use sqlx::any::{AnyConnectOptions, AnyPoolOptions};

#[derive(Clone, Debug)]
pub struct AnyStore {
    pool: sqlx::Pool<sqlx::Any>,
}

impl AnyStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible URL, e.g. `"sqlite://listings.db?mode=rwc"`
    /// or `"sqlite::memory:"` for tests. An in-memory database lives in a
    /// single connection, so the pool is pinned to exactly one.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let options = AnyConnectOptions::from_str(url)?;
        let mut pool_options = AnyPoolOptions::new().max_connections(max_connections.max(1));
        if url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Close every pooled connection; later acquisitions fail immediately.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
