use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use skp_core::model::{
    AchievementDetails, AchievementStatus, AchievementType, Attachment, CertificationDetails,
    CompetitionDetails, OrganizationDetails, Period, PublicationDetails,
};
use skp_core::query::{ListMeta, SortField, SortOrder};
use skp_core::request::{
    CertificationInput, CompetitionInput, CreateAchievementRequest, OrganizationInput,
    PublicationInput, RejectRequest, UpdateAchievementRequest, VerifyRequest,
};
use skp_core::view::{AchievementView, HistoryView};

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HealthOk {
    pub ok: bool,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct AboutResponse {
    pub service: String,
    pub version: String,
    #[schema(nullable, value_type = Option<String>)]
    pub docs_url: Option<String>,
    #[schema(example = json!(["GET /healthz", "GET /achievements"]))]
    pub endpoints: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub endpoints_meta: Vec<serde_json::Value>,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct AchievementPage {
    pub items: Vec<AchievementView>,
    pub meta: ListMeta,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct AchievementEnvelope {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<AchievementView>,
    pub error: Option<String>,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct AchievementPageEnvelope {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<AchievementPage>,
    pub error: Option<String>,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HistoryEnvelope {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<HistoryView>,
    pub error: Option<String>,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct AttachmentEnvelope {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<Attachment>,
    pub error: Option<String>,
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::meta::healthz,
        crate::api::meta::about,
        crate::api::achievements::achievements_list,
        crate::api::achievements::achievements_create,
        crate::api::achievements::achievements_get,
        crate::api::achievements::achievements_update,
        crate::api::achievements::achievements_delete,
        crate::api::achievements::achievements_submit,
        crate::api::achievements::achievements_verify,
        crate::api::achievements::achievements_reject,
        crate::api::achievements::achievements_history,
        crate::api::achievements::achievements_upload,
        crate::api::students::student_achievements,
    ),
    components(
        schemas(
            HealthOk, AboutResponse, UploadForm, AchievementPage,
            AchievementEnvelope, AchievementPageEnvelope, HistoryEnvelope, AttachmentEnvelope,
            AchievementView, HistoryView, ListMeta, SortField, SortOrder,
            AchievementStatus, AchievementType, AchievementDetails, Attachment,
            CompetitionDetails, PublicationDetails, OrganizationDetails, CertificationDetails, Period,
            CreateAchievementRequest, UpdateAchievementRequest, VerifyRequest, RejectRequest,
            CompetitionInput, PublicationInput, OrganizationInput, CertificationInput,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Meta", description = "Service metadata and health"),
        (name = "Achievements", description = "Achievement records and attachments"),
        (name = "Workflow", description = "Submission, verification and audit"),
        (name = "Students", description = "Per-student administrative views")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthz",
            "/achievements",
            "/achievements/{id}",
            "/achievements/{id}/verify",
            "/achievements/{id}/attachments",
            "/students/{id}/achievements",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let yaml = doc.to_yaml().expect("yaml");
        assert!(yaml.contains("bearer"));
    }
}
