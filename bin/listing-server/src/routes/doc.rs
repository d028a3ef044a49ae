use utoipa::OpenApi;

use crate::routes::{bulk, health, listing};

#[derive(OpenApi)]
#[openapi(info(
    title = "listing-server",
    description = "Student housing listing service",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(listing::ListingApi::openapi());
    root.merge(bulk::BulkApi::openapi());
    root
}
