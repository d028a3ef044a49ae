//! Listing CRUD, search, image upload and availability endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use listing_core::NewListing;
use tracing::{debug, info};
use utoipa::OpenApi;
use validator::Validate;

use crate::entities::{ListingPatch, ListingRecord, ListingStore};
use crate::error::ServerError;
use crate::extract::{ApiJson, ApiMultipart, ApiPath, ApiQuery};
use crate::schemas::listing::{
    check_window, AvailabilityPatch, ImageUpload, ListingLinks, ListingPage, ListingResponse,
    ListingSearchQuery, MessageResponse, UpdateListingRequest, UploadedImages,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_listing,
        search_listings,
        get_listing,
        update_listing,
        delete_listing,
        upload_images,
        patch_availability
    ),
    components(schemas(
        NewListing,
        ListingResponse,
        ListingLinks,
        ListingPage,
        UpdateListingRequest,
        AvailabilityPatch,
        MessageResponse,
        ImageUpload,
        UploadedImages
    ))
)]
pub struct ListingApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/listing", post(create_listing).get(search_listings))
        .route(
            "/listing/{id}",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/listing/{id}/images", post(upload_images))
        .route("/listing/{id}/availability", patch(patch_availability))
}

#[utoipa::path(
    post,
    path = "/listing",
    tag = "listing",
    request_body = NewListing,
    responses(
        (status = 201, description = "Listing created", body = ListingResponse),
        (status = 409, description = "Landlord already has a listing with this name"),
        (status = 422, description = "Invalid listing"),
    )
)]
pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<NewListing>,
) -> Result<Response, ServerError> {
    req.validate()?;
    let record = state.store.insert_listing(&req).await.map_err(conflict_or_database)?;
    info!(listing_id = record.id, "listing created");
    Ok(with_etag(StatusCode::CREATED, &record))
}

#[utoipa::path(
    get,
    path = "/listing",
    tag = "listing",
    params(ListingSearchQuery),
    responses(
        (status = 200, description = "Matching listings", body = ListingPage),
        (status = 422, description = "Invalid paging parameters"),
    )
)]
pub async fn search_listings(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ListingSearchQuery>,
) -> Result<Json<ListingPage>, ServerError> {
    q.validate()?;
    let (total, records) = state.store.search_listings(&q.to_filter()).await?;
    debug!(total, returned = records.len(), "listing search");
    Ok(Json(ListingPage {
        total,
        page: q.page(),
        page_size: q.page_size(),
        items: records.iter().map(ListingRecord::to_response).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/listing/{id}",
    tag = "listing",
    params(("id" = i64, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Listing", body = ListingResponse),
        (status = 304, description = "Unchanged since the supplied ETag"),
        (status = 404, description = "Listing not found"),
    )
)]
pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let record = load(&state, id).await?;
    let etag = record.etag();
    if header_matches(&headers, header::IF_NONE_MATCH, &etag) == Some(true) {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }
    Ok(with_etag(StatusCode::OK, &record))
}

#[utoipa::path(
    put,
    path = "/listing/{id}",
    tag = "listing",
    params(("id" = i64, Path, description = "Listing ID")),
    request_body = UpdateListingRequest,
    responses(
        (status = 200, description = "Listing updated", body = ListingResponse),
        (status = 400, description = "Availability window would be inverted"),
        (status = 404, description = "Listing not found"),
        (status = 409, description = "Landlord already has a listing with this name"),
        (status = 412, description = "If-Match does not match the current ETag"),
        (status = 422, description = "Invalid field"),
    )
)]
pub async fn update_listing(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<UpdateListingRequest>,
) -> Result<Response, ServerError> {
    req.validate()?;
    let current = load(&state, id).await?;
    if header_matches(&headers, header::IF_MATCH, &current.etag()) == Some(false) {
        return Err(ServerError::PreconditionFailed("ETag mismatch".into()));
    }
    let record = apply_patch(&state, &current, req.into()).await?;
    info!(listing_id = id, "listing updated");
    Ok(with_etag(StatusCode::OK, &record))
}

#[utoipa::path(
    delete,
    path = "/listing/{id}",
    tag = "listing",
    params(("id" = i64, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Listing deleted", body = MessageResponse),
        (status = 404, description = "Listing not found"),
    )
)]
pub async fn delete_listing(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageResponse>, ServerError> {
    check_id(id)?;
    if !state.store.delete_listing(id).await? {
        return Err(ServerError::listing_not_found());
    }
    info!(listing_id = id, "listing deleted");
    Ok(Json(MessageResponse { message: "Listing deleted.".into() }))
}

#[utoipa::path(
    post,
    path = "/listing/{id}/images",
    tag = "listing",
    params(("id" = i64, Path, description = "Listing ID")),
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Images attached", body = UploadedImages),
        (status = 400, description = "No files uploaded"),
        (status = 404, description = "Listing not found"),
    )
)]
pub async fn upload_images(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiMultipart(mut multipart): ApiMultipart,
) -> Result<Json<UploadedImages>, ServerError> {
    load(&state, id).await?;

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        let Some(file_name) = field.file_name().and_then(base_name).map(str::to_owned) else {
            debug!(listing_id = id, "skipping part without a usable file name");
            continue;
        };
        // Files are not kept; drain the part so the stream can advance.
        let size = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Failed to read file: {e}")))?
            .len();
        debug!(listing_id = id, file_name = %file_name, size, "image received");
        uploaded.push(image_url(&state.config.image_base_url, id, &file_name));
    }

    if uploaded.is_empty() {
        return Err(ServerError::BadRequest("No files uploaded".into()));
    }
    if !state.store.add_listing_images(id, &uploaded).await? {
        return Err(ServerError::listing_not_found());
    }
    info!(listing_id = id, count = uploaded.len(), "images attached");
    Ok(Json(UploadedImages { uploaded }))
}

#[utoipa::path(
    patch,
    path = "/listing/{id}/availability",
    tag = "listing",
    params(("id" = i64, Path, description = "Listing ID")),
    request_body = AvailabilityPatch,
    responses(
        (status = 200, description = "Availability updated", body = ListingResponse),
        (status = 400, description = "No dates supplied or inverted window"),
        (status = 404, description = "Listing not found"),
    )
)]
pub async fn patch_availability(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<AvailabilityPatch>,
) -> Result<Response, ServerError> {
    if req.start_date.is_none() && req.end_date.is_none() {
        return Err(ServerError::BadRequest(
            "Provide at least one of start_date or end_date".into(),
        ));
    }
    let current = load(&state, id).await?;
    let record = apply_patch(&state, &current, req.into()).await?;
    info!(listing_id = id, "availability updated");
    Ok(with_etag(StatusCode::OK, &record))
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn check_id(id: i64) -> Result<(), ServerError> {
    if id < 1 {
        return Err(ServerError::BadRequest("Listing ID must be >= 1".into()));
    }
    Ok(())
}

async fn load(state: &AppState, id: i64) -> Result<ListingRecord, ServerError> {
    check_id(id)?;
    state.store.get_listing(id).await?.ok_or_else(ServerError::listing_not_found)
}

async fn apply_patch(
    state: &AppState,
    current: &ListingRecord,
    patch: ListingPatch,
) -> Result<ListingRecord, ServerError> {
    if patch.is_empty() {
        return Ok(current.clone());
    }
    if let Err(e) = check_window(&patch.clone().merged(current)) {
        let message = e.message.map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
        return Err(ServerError::BadRequest(message));
    }
    state
        .store
        .update_listing(current.id, patch)
        .await
        .map_err(conflict_or_database)?
        .ok_or_else(ServerError::listing_not_found)
}

fn with_etag(status: StatusCode, record: &ListingRecord) -> Response {
    (status, [(header::ETAG, record.etag())], Json(record.to_response())).into_response()
}

/// `None` when the header is absent; otherwise whether any listed tag (or
/// `*`) matches `etag`.
fn header_matches(headers: &HeaderMap, name: header::HeaderName, etag: &str) -> Option<bool> {
    let raw = headers.get(name)?.to_str().ok()?;
    Some(raw.split(',').map(str::trim).any(|tag| {
        tag == "*" || tag.strip_prefix("W/").unwrap_or(tag) == etag
    }))
}

/// Last path segment of a client-supplied file name. Empty names and the
/// `.`/`..` segments are refused.
fn base_name(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    (!matches!(name, "" | "." | "..")).then_some(name)
}

fn image_url(base: &str, id: i64, file_name: &str) -> String {
    format!("{}/{id}/{}", base.trim_end_matches('/'), urlencoding::encode(file_name))
}

fn conflict_or_database(e: sqlx::Error) -> ServerError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return ServerError::Conflict(
                "A listing with this name already exists for this landlord".into(),
            );
        }
    }
    ServerError::Database(e)
}
