use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use skp_core::attachment::IncomingFile;
use skp_core::query::ListParams;
use skp_core::request::{
    CreateAchievementRequest, RejectRequest, UpdateAchievementRequest, VerifyRequest,
};

use crate::identity::Authenticated;
use crate::responses::{self, ApiError, ApiResult};
use crate::AppState;

/// Multipart field carrying the attachment.
const FILE_FIELD: &str = "file";

pub(crate) fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::validation("id must be a UUID"))
}

pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::validation(format!("invalid request body: {}", e.body_text())))
}

pub(crate) fn list_params(
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<ListParams, ApiError> {
    query
        .map(|Query(p)| p)
        .map_err(|e| ApiError::validation(format!("invalid query string: {}", e.body_text())))
}

/// List achievements visible to the caller.
#[utoipa::path(
    get,
    path = "/achievements",
    tag = "Achievements",
    operation_id = "achievements_list_doc",
    description = "Role-scoped listing: students see their own, advisors see advisees' non-drafts, admins see everything submitted or decided.",
    params(ListParams),
    responses(
        (status = 200, description = "Envelope with { items, meta }", body = crate::openapi::AchievementPageEnvelope),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_list(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    query: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult {
    let params = list_params(query)?;
    let page = state.workflow().list(&identity, &params).await?;
    Ok(responses::json_ok(page))
}

/// Create a draft achievement for the calling student.
#[utoipa::path(
    post,
    path = "/achievements",
    tag = "Achievements",
    operation_id = "achievements_create_doc",
    request_body = CreateAchievementRequest,
    responses(
        (status = 201, description = "Created", body = crate::openapi::AchievementEnvelope),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Missing achievement:create")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_create(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    body: Result<Json<CreateAchievementRequest>, JsonRejection>,
) -> ApiResult {
    let req = json_body(body)?;
    let view = state.workflow().create(&identity, req).await?;
    Ok(responses::with_message(
        StatusCode::CREATED,
        "Achievement created",
        Some(view),
    ))
}

#[utoipa::path(
    get,
    path = "/achievements/{id}",
    tag = "Achievements",
    operation_id = "achievements_get_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    responses(
        (status = 200, description = "Achievement", body = crate::openapi::AchievementEnvelope),
        (status = 403, description = "Not owner, advisor or admin"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_get(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let view = state.workflow().get(&identity, id).await?;
    Ok(responses::json_ok(view))
}

/// Merge-patch update; a rejected achievement returns to draft.
#[utoipa::path(
    put,
    path = "/achievements/{id}",
    tag = "Achievements",
    operation_id = "achievements_update_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    request_body = UpdateAchievementRequest,
    responses(
        (status = 200, description = "Updated", body = crate::openapi::AchievementEnvelope),
        (status = 400, description = "Validation error or not draft/rejected"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_update(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateAchievementRequest>, JsonRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let req = json_body(body)?;
    let view = state.workflow().update(&identity, id, req).await?;
    Ok(responses::with_message(
        StatusCode::OK,
        "Achievement updated",
        Some(view),
    ))
}

#[utoipa::path(
    delete,
    path = "/achievements/{id}",
    tag = "Achievements",
    operation_id = "achievements_delete_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    responses(
        (status = 200, description = "Soft-deleted"),
        (status = 400, description = "Not a draft"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_delete(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    state.workflow().delete(&identity, id).await?;
    Ok(responses::with_message::<()>(
        StatusCode::OK,
        "Achievement deleted",
        None,
    ))
}

#[utoipa::path(
    post,
    path = "/achievements/{id}/submit",
    tag = "Workflow",
    operation_id = "achievements_submit_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    responses(
        (status = 200, description = "Submitted", body = crate::openapi::AchievementEnvelope),
        (status = 400, description = "Not a draft"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_submit(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let view = state.workflow().submit(&identity, id).await?;
    Ok(responses::with_message(
        StatusCode::OK,
        "Achievement submitted for verification",
        Some(view),
    ))
}

#[utoipa::path(
    post,
    path = "/achievements/{id}/verify",
    tag = "Workflow",
    operation_id = "achievements_verify_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verified", body = crate::openapi::AchievementEnvelope),
        (status = 400, description = "Not submitted, or points <= 0"),
        (status = 403, description = "Not the student's advisor"),
        (status = 404, description = "Absent or deleted"),
        (status = 500, description = "Verified but points not recorded")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_verify(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let req = json_body(body)?;
    let view = state.workflow().verify(&identity, id, req.points).await?;
    Ok(responses::with_message(
        StatusCode::OK,
        "Achievement verified",
        Some(view),
    ))
}

#[utoipa::path(
    post,
    path = "/achievements/{id}/reject",
    tag = "Workflow",
    operation_id = "achievements_reject_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = crate::openapi::AchievementEnvelope),
        (status = 400, description = "Not submitted, or empty rejection_note"),
        (status = 403, description = "Not the student's advisor"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_reject(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let req = json_body(body)?;
    let view = state
        .workflow()
        .reject(&identity, id, &req.rejection_note)
        .await?;
    Ok(responses::with_message(
        StatusCode::OK,
        "Achievement rejected",
        Some(view),
    ))
}

#[utoipa::path(
    get,
    path = "/achievements/{id}/history",
    tag = "Workflow",
    operation_id = "achievements_history_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    responses(
        (status = 200, description = "Status history", body = crate::openapi::HistoryEnvelope),
        (status = 403, description = "Not owner, advisor or admin"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_history(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let history = state.workflow().history(&identity, id).await?;
    Ok(responses::json_ok(history))
}

fn multipart_error(err: MultipartError, max_bytes: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::validation(format!("file exceeds the {max_bytes} byte limit"))
    } else {
        ApiError::validation(format!("invalid multipart body: {}", err.body_text()))
    }
}

/// Reads the `file` field; other fields are ignored. A missing field yields an
/// empty file so the workflow reports it after its own checks.
async fn read_file(mut multipart: Multipart, max_bytes: u64) -> Result<IncomingFile, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?;
        return Ok(IncomingFile {
            filename,
            bytes: bytes.to_vec(),
        });
    }
    Ok(IncomingFile {
        filename: String::new(),
        bytes: Vec::new(),
    })
}

/// Upload an attachment to a draft achievement.
#[utoipa::path(
    post,
    path = "/achievements/{id}/attachments",
    tag = "Achievements",
    operation_id = "achievements_upload_doc",
    params(("id" = Uuid, Path, description = "Achievement id")),
    request_body(content = crate::openapi::UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Attachment stored", body = crate::openapi::AttachmentEnvelope),
        (status = 400, description = "Not a draft, wrong type or too large"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Absent or deleted")
    ),
    security(("bearer" = []))
)]
pub async fn achievements_upload(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let id = path_id(path)?;
    let multipart = multipart
        .map_err(|e| ApiError::validation(format!("expected multipart/form-data: {}", e.body_text())))?;
    let file = read_file(multipart, state.workflow().policy().max_bytes).await?;
    let attachment = state
        .workflow()
        .upload_attachment(&identity, id, file)
        .await?;
    Ok(responses::with_message(
        StatusCode::CREATED,
        "Attachment uploaded",
        Some(attachment),
    ))
}
