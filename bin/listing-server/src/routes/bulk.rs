//! Asynchronous bulk-create endpoints.
//!
//! Submission only registers a task and returns `202 Accepted`; the batch is
//! written by a background worker and progress is polled by task id.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use listing_core::{
    BulkCreateResults, BulkCreateTask, BulkListingCreate, BulkTaskHandle, BulkTaskStatus,
    CreatedListing, NewListing, BULK_LIMIT,
};
use tracing::info;
use utoipa::OpenApi;
use validator::Validate;

use crate::error::ServerError;
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(bulk_create, get_bulk_task),
    components(schemas(
        BulkListingCreate,
        NewListing,
        BulkTaskHandle,
        BulkCreateTask,
        BulkTaskStatus,
        BulkCreateResults,
        CreatedListing
    ))
)]
pub struct BulkApi;

/// Body cap for a bulk submission; fits `BULK_LIMIT` listings with every
/// field at its maximum length.
pub(crate) const BULK_BODY_LIMIT: usize = BULK_LIMIT as usize * 16 * 1024;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/listing/bulk-create",
            post(bulk_create).layer(DefaultBodyLimit::max(BULK_BODY_LIMIT)),
        )
        .route("/bulk-create/task/{task_id}", get(get_bulk_task))
}

#[utoipa::path(
    post,
    path = "/listing/bulk-create",
    tag = "bulk",
    request_body = BulkListingCreate,
    responses(
        (status = 202, description = "Batch accepted", body = BulkTaskHandle),
        (status = 422, description = "Invalid listing in batch"),
    )
)]
pub async fn bulk_create(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<BulkListingCreate>,
) -> Result<(StatusCode, Json<BulkTaskHandle>), ServerError> {
    req.validate()?;
    let handle = state.bulk.submit_batch(req.listings).await;
    info!(task_id = %handle.task_id, "bulk create accepted");
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

#[utoipa::path(
    get,
    path = "/bulk-create/task/{task_id}",
    tag = "bulk",
    params(("task_id" = String, Path, description = "Id returned by bulk-create")),
    responses(
        (status = 200, description = "Task snapshot", body = BulkCreateTask),
        (status = 404, description = "Bulk create task not found"),
    )
)]
pub async fn get_bulk_task(
    State(state): State<Arc<AppState>>,
    ApiPath(task_id): ApiPath<String>,
) -> Result<Json<BulkCreateTask>, ServerError> {
    state
        .bulk
        .get_status(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Bulk create task not found".into()))
}
