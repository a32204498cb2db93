use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use uuid::Uuid;

use skp_core::query::ListParams;

use super::achievements::{list_params, path_id};
use crate::identity::Authenticated;
use crate::responses::{self, ApiResult};
use crate::AppState;

/// One student's achievements, drafts included.
#[utoipa::path(
    get,
    path = "/students/{id}/achievements",
    tag = "Students",
    operation_id = "student_achievements_doc",
    description = "Administrative listing; requires user:manage.",
    params(("id" = Uuid, Path, description = "Student id"), ListParams),
    responses(
        (status = 200, description = "Envelope with { items, meta }", body = crate::openapi::AchievementPageEnvelope),
        (status = 403, description = "Missing user:manage"),
        (status = 404, description = "Unknown student")
    ),
    security(("bearer" = []))
)]
pub async fn student_achievements(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let student_id = path_id(path)?;
    let params = list_params(query)?;
    let page = state
        .workflow()
        .list_for_student(&identity, student_id, &params)
        .await?;
    Ok(responses::json_ok(page))
}
