use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::{
    AchievementDetails, AchievementDocument, AchievementStatus, AchievementType, Attachment,
    ReferenceRecord,
};

/// Reference row merged with its document, as returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct AchievementView {
    pub id: Uuid,
    pub external_document_id: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub status: AchievementStatus,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AchievementDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementView {
    /// `updated_at` is the later of the two stores' timestamps.
    pub fn assemble(record: &ReferenceRecord, doc: AchievementDocument) -> Self {
        let r = &record.reference;
        Self {
            id: r.id,
            external_document_id: r.external_document_id.clone(),
            student_id: r.student_id,
            student_name: record.student_name.clone(),
            status: r.status,
            achievement_type: doc.achievement_type,
            title: doc.title,
            description: doc.description,
            details: doc.details,
            event_date: doc.event_date,
            attachments: doc.attachments,
            tags: doc.tags,
            points: doc.points,
            rejection_note: r.rejection_note.clone(),
            submitted_at: r.submitted_at,
            verified_at: r.verified_at,
            rejected_at: r.rejected_at,
            created_at: r.created_at,
            updated_at: r.updated_at.max(doc.updated_at),
        }
    }
}

/// Read-only audit projection of one achievement.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct HistoryView {
    pub id: Uuid,
    pub title: String,
    pub status: AchievementStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub verifier_name: Option<String>,
    pub rejection_note: Option<String>,
    pub points: i64,
}

impl HistoryView {
    pub fn assemble(record: &ReferenceRecord, doc: &AchievementDocument) -> Self {
        let r = &record.reference;
        Self {
            id: r.id,
            title: doc.title.clone(),
            status: r.status,
            created_at: r.created_at,
            submitted_at: r.submitted_at,
            verified_at: r.verified_at,
            rejected_at: r.rejected_at,
            verifier_name: record.verifier_name.clone(),
            rejection_note: r.rejection_note.clone(),
            points: doc.points,
        }
    }
}
