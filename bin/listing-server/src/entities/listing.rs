use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, NaiveDateTime, Utc};
use listing_core::{NewListing, DATETIME_FORMAT};
use sqlx::{Any, AnyConnection, QueryBuilder};

use crate::entities::dao::{ListingFilter, ListingPatch, ListingRecord};
use crate::entities::AnyStore;

pub trait ListingStore: Send + Sync + 'static {
    fn insert_listing(
        &self,
        listing: &NewListing,
    ) -> impl Future<Output = Result<ListingRecord, sqlx::Error>> + Send;
    fn get_listing(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<ListingRecord>, sqlx::Error>> + Send;
    /// Apply `patch` and bump `updated_at`. `None` when the listing is gone.
    fn update_listing(
        &self,
        id: i64,
        patch: ListingPatch,
    ) -> impl Future<Output = Result<Option<ListingRecord>, sqlx::Error>> + Send;
    /// Returns `false` when nothing was deleted.
    fn delete_listing(&self, id: i64) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Total matches (ignoring pagination) and the requested page.
    fn search_listings(
        &self,
        filter: &ListingFilter,
    ) -> impl Future<Output = Result<(i64, Vec<ListingRecord>), sqlx::Error>> + Send;
    /// Append image URLs. Returns `false` when the listing does not exist.
    fn add_listing_images(
        &self,
        id: i64,
        urls: &[String],
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

type ListingRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

const LISTING_COLUMNS: &str = "id, landlord_email, name, address, start_date, end_date, \
                               description, picture_url, created_at, updated_at";

impl ListingStore for AnyStore {
    async fn insert_listing(&self, listing: &NewListing) -> Result<ListingRecord, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = insert_listing_row(&mut tx, listing).await?;
        let record = fetch_listing(&mut tx, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;
        Ok(record)
    }

    async fn get_listing(&self, id: i64) -> Result<Option<ListingRecord>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_listing(&mut conn, id).await
    }

    async fn update_listing(
        &self,
        id: i64,
        patch: ListingPatch,
    ) -> Result<Option<ListingRecord>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let Some(current) = fetch_listing(&mut tx, id).await? else {
            return Ok(None);
        };
        let next = patch.merged(&current);
        sqlx::query(
            "UPDATE listings SET landlord_email = ?, name = ?, address = ?, start_date = ?, \
             end_date = ?, description = ?, picture_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&next.landlord_email)
        .bind(&next.name)
        .bind(&next.address)
        .bind(format_datetime(next.start_date))
        .bind(next.end_date.map(format_datetime))
        .bind(&next.description)
        .bind(&next.picture_url)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let updated = fetch_listing(&mut tx, id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_listing(&self, id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM listing_images WHERE listing_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM listings WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_listings(
        &self,
        filter: &ListingFilter,
    ) -> Result<(i64, Vec<ListingRecord>), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;

        let mut count = QueryBuilder::<Any>::new("SELECT COUNT(*) FROM listings");
        push_filters(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&mut *conn).await?;

        let mut page = QueryBuilder::<Any>::new(format!("SELECT {LISTING_COLUMNS} FROM listings"));
        push_filters(&mut page, filter);
        let column = filter.sort.field.column();
        let dir = if filter.sort.descending { "DESC" } else { "ASC" };
        // Rows without a value sort after the rest when ascending.
        page.push(format!(" ORDER BY {column} IS NULL {dir}, {column} {dir}, id ASC"));
        page.push(" LIMIT ").push_bind(filter.limit);
        page.push(" OFFSET ").push_bind(filter.offset);
        let rows: Vec<ListingRow> = page.build_query_as().fetch_all(&mut *conn).await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        let mut images = fetch_images(&mut conn, &ids).await?;
        let records = rows
            .into_iter()
            .map(|row| {
                let urls = images.remove(&row.0).unwrap_or_default();
                to_record(row, urls)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((total, records))
    }

    async fn add_listing_images(&self, id: i64, urls: &[String]) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let touched = sqlx::query("UPDATE listings SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Ok(false);
        }
        for url in urls {
            sqlx::query("INSERT INTO listing_images (listing_id, url, created_at) VALUES (?, ?, ?)")
                .bind(id)
                .bind(url)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }
}

// ── row helpers (shared with the bulk batch) ─────────────────────────────────

pub(crate) fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Insert one listing on `conn` and return its assigned id.
pub(crate) async fn insert_listing_row(
    conn: &mut AnyConnection,
    listing: &NewListing,
) -> Result<i64, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO listings (landlord_email, name, address, start_date, end_date, \
         description, picture_url, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&listing.landlord_email)
    .bind(&listing.name)
    .bind(&listing.address)
    .bind(format_datetime(listing.start_date))
    .bind(listing.end_date.map(format_datetime))
    .bind(&listing.description)
    .bind(&listing.picture_url)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn fetch_listing(
    conn: &mut AnyConnection,
    id: i64,
) -> Result<Option<ListingRecord>, sqlx::Error> {
    let row: Option<ListingRow> =
        sqlx::query_as(&format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut images = fetch_images(conn, &[id]).await?;
    to_record(row, images.remove(&id).unwrap_or_default()).map(Some)
}

async fn fetch_images(
    conn: &mut AnyConnection,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>, sqlx::Error> {
    let mut by_listing: HashMap<i64, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(by_listing);
    }
    let mut query =
        QueryBuilder::<Any>::new("SELECT listing_id, url FROM listing_images WHERE listing_id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id ASC");
    let rows: Vec<(i64, String)> = query.build_query_as().fetch_all(&mut *conn).await?;
    for (listing_id, url) in rows {
        by_listing.entry(listing_id).or_default().push(url);
    }
    Ok(by_listing)
}

fn push_filters(query: &mut QueryBuilder<'_, Any>, filter: &ListingFilter) {
    let mut prefix = " WHERE ";
    if let Some(address) = &filter.address {
        query
            .push(prefix)
            .push("LOWER(address) LIKE ")
            .push_bind(format!("%{}%", address.to_lowercase()));
        prefix = " AND ";
    }
    if let Some(email) = &filter.landlord_email {
        query.push(prefix).push("landlord_email = ").push_bind(email.clone());
        prefix = " AND ";
    }
    if let Some(from) = filter.start_from {
        query.push(prefix).push("start_date >= ").push_bind(format_datetime(from));
        prefix = " AND ";
    }
    if let Some(to) = filter.start_to {
        query.push(prefix).push("start_date <= ").push_bind(format_datetime(to));
    }
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, sqlx::Error> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn parse_timestamp(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, column, error = %e, "failed to parse listing timestamp; using now");
        Utc::now()
    })
}

fn to_record(row: ListingRow, image_urls: Vec<String>) -> Result<ListingRecord, sqlx::Error> {
    let (id, landlord_email, name, address, start_date, end_date, description, picture_url, created_at, updated_at) =
        row;
    Ok(ListingRecord {
        id,
        landlord_email,
        name,
        address,
        start_date: parse_datetime(&start_date)?,
        end_date: end_date.as_deref().map(parse_datetime).transpose()?,
        description,
        picture_url,
        image_urls,
        created_at: parse_timestamp(&created_at, "created_at"),
        updated_at: parse_timestamp(&updated_at, "updated_at"),
    })
}
