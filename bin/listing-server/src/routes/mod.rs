//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - CORS and per-request trace-ID middleware
//! - Optional Swagger UI / OpenAPI document (`LISTING_ENABLE_SWAGGER=false` disables it)
//! - Service banner and health routes
//! - Listing CRUD, search, images and availability routes
//! - Bulk-create submission and task polling

mod bulk;
pub mod doc;
mod health;
mod listing;


use std::sync::Arc;

use axum::{middleware, Router};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(listing::router())
        .merge(bulk::router());

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app.layer(ServiceBuilder::new().layer(cors::cors_layer(&state)))
        .layer(middleware::from_fn_with_state(state.clone(), trace::trace_middleware))
        .with_state(state)
}
