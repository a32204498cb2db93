use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use crate::responses;
use crate::AppState;

/// Health probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    operation_id = "healthz_doc",
    description = "Service readiness probe.",
    responses(
        (status = 200, description = "Service healthy", body = crate::openapi::HealthOk)
    )
)]
pub async fn healthz() -> Response {
    responses::json_ok(json!({"ok": true}))
}

/// Service metadata and endpoints index.
#[utoipa::path(
    get,
    path = "/about",
    tag = "Meta",
    operation_id = "about_doc",
    description = "Service name, version and registered endpoints.",
    responses(
        (status = 200, description = "Service metadata", body = crate::openapi::AboutResponse)
    )
)]
pub async fn about(State(state): State<AppState>) -> Response {
    let endpoints = state.endpoints();
    let endpoints_meta = state.endpoints_meta();
    responses::json_ok(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "docs_url": std::env::var("SKP_DOCS_URL").ok(),
        "endpoints": endpoints.as_ref(),
        "endpoints_meta": endpoints_meta.as_ref(),
    }))
}
