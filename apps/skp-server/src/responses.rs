use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use skp_core::WorkflowError;

use crate::request_ctx;

/// Body shape shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn json_ok<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }),
    )
        .into_response()
}

pub fn with_message<T: Serialize>(status: StatusCode, message: &str, data: Option<T>) -> Response {
    (
        status,
        Json(Envelope {
            success: true,
            message: Some(message.to_string()),
            data,
            error: None,
        }),
    )
        .into_response()
}

/// Workflow failure rendered as an error envelope.
#[derive(Debug)]
pub struct ApiError(pub WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError(WorkflowError::validation(msg))
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        ApiError(WorkflowError::Unauthenticated(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            WorkflowError::Validation(_) | WorkflowError::InvalidState { .. } => {
                StatusCode::BAD_REQUEST
            }
            WorkflowError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            WorkflowError::Storage(detail) => {
                let corr = request_ctx::current();
                error!(
                    target: "skp::http",
                    request_id = corr.as_ref().map(|c| c.request_id()).unwrap_or("-"),
                    corr_id = corr.as_ref().map(|c| c.corr_id()).unwrap_or("-"),
                    error = %detail,
                    "storage failure"
                );
                "internal storage error; the change may have been partially applied".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(Envelope::<()> {
                success: false,
                message: Some(message),
                data: None,
                error: Some(self.0.code().to_string()),
            }),
        )
            .into_response()
    }
}

pub type ApiResult = Result<Response, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use skp_core::model::AchievementStatus;

    async fn body(res: Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn errors_map_to_statuses_and_codes() {
        let cases = [
            (WorkflowError::validation("bad"), 400, "validation_error"),
            (
                WorkflowError::Unauthenticated("who".into()),
                401,
                "authentication_error",
            ),
            (WorkflowError::forbidden("no"), 403, "authorization_error"),
            (WorkflowError::not_found("gone"), 404, "not_found"),
            (
                WorkflowError::InvalidState {
                    current: AchievementStatus::Verified,
                    action: "submit",
                },
                400,
                "invalid_state",
            ),
            (WorkflowError::Storage("disk".into()), 500, "storage_error"),
        ];
        for (err, status, code) in cases {
            let res = ApiError(err).into_response();
            assert_eq!(res.status().as_u16(), status);
            let json = body(res).await;
            assert_eq!(json["success"], false);
            assert_eq!(json["error"], code);
            assert!(json.get("data").is_none());
        }
    }

    #[tokio::test]
    async fn storage_detail_is_not_leaked() {
        let res = ApiError(WorkflowError::Storage("sqlite: disk I/O error".into())).into_response();
        let json = body(res).await;
        assert!(!json["message"].as_str().unwrap().contains("sqlite"));
    }

    #[tokio::test]
    async fn ok_envelope_carries_data() {
        let json = body(json_ok(serde_json::json!({"n": 1}))).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["n"], 1);
        assert!(json.get("error").is_none());
    }
}
