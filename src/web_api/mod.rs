//! WebAPI - camera webhook surface
//!
//! ## Responsibilities
//!
//! - Accept notification POSTs on any path
//! - Reject every other method with 400
//! - Always acknowledge POSTs with 200, even when the body is junk
//!
//! Cameras retry aggressively on error responses; acknowledging
//! malformed payloads keeps them from flooding the endpoint.

use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::Router;

/// Create the webhook router
pub fn create_router(state: AppState) -> Router {
    Router::new().fallback(notify).with_state(state)
}

/// Single handler for every path the camera may be configured with
async fn notify(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if method != Method::POST {
        tracing::debug!(method = %method, "Non-POST request rejected");
        return StatusCode::BAD_REQUEST;
    }

    state.pipeline.handle(&headers, &body).await;
    StatusCode::OK
}
