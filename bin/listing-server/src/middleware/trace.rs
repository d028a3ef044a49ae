use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use http_body_util::{BodyExt, Limited};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::state::AppState;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON bodies shorter than this are logged verbatim; everything else is
/// streamed through untouched.
const MAX_LOGGED_BODY: usize = 1024;

/// Wrap every request in an `http_request` span keyed by an `x-trace-id`.
///
/// A valid UUID supplied by the caller is reused; anything else is replaced
/// with a fresh one. The id is echoed on the response.
pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("request started");
        let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();

        let (parts, body) = req.into_parts();
        let body = log_body("request", &parts.headers, body).await;
        let mut req = Request::from_parts(parts, body);
        if let Some(v) = &header_value {
            req.headers_mut().insert(X_TRACE_ID, v.clone());
        }

        let response = next.run(req).await;

        let (parts, body) = response.into_parts();
        let body = log_body("response", &parts.headers, body).await;
        let mut response = Response::from_parts(parts, body);
        if let Some(v) = header_value {
            response.headers_mut().insert(X_TRACE_ID, v);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "response finished"
        );
        response
    }
    .instrument(span)
    .await
}

async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Body {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let upper = body.size_hint().upper();

    let small = upper.is_some_and(|n| (n as usize) < MAX_LOGGED_BODY);
    if !content_type.contains("application/json") || !small {
        if upper != Some(0) {
            info!(direction, content_type, size = ?upper, "body skipped");
        }
        return body;
    }

    let bytes = match Limited::new(body, MAX_LOGGED_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(direction, error = %e, "failed to buffer body");
            return Body::empty();
        }
    };
    if let Ok(text) = std::str::from_utf8(&bytes) {
        info!(direction, body = %text, "body");
    }
    Body::from(bytes)
}
