//! Store seams the workflow engine is built against.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    AchievementDocument, AchievementReference, AchievementStatus, Attachment, NewDocument,
    ReferenceRecord, StudentProfile,
};
use crate::query::ReferenceFilter;
use crate::request::DocumentPatch;

/// Status write plus the audit fields that go with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusChange {
    /// Sets `submitted_at`.
    Submitted,
    /// Sets `verified_at` and `verified_by`.
    Verified { verifier: Uuid },
    /// Sets `rejected_at`, `verified_by` and `rejection_note`.
    Rejected { verifier: Uuid, note: String },
    /// Back to draft; clears the decision fields, keeps `submitted_at`.
    Reopened,
    /// Draft stays draft; only `updated_at` moves. Claims the row for a content edit.
    Edited,
    /// Soft delete of a draft.
    Deleted,
}

impl StatusChange {
    pub fn target(&self) -> AchievementStatus {
        match self {
            StatusChange::Submitted => AchievementStatus::Submitted,
            StatusChange::Verified { .. } => AchievementStatus::Verified,
            StatusChange::Rejected { .. } => AchievementStatus::Rejected,
            StatusChange::Reopened | StatusChange::Edited => AchievementStatus::Draft,
            StatusChange::Deleted => AchievementStatus::Deleted,
        }
    }
}

/// Relational store: ownership, lifecycle status, audit timestamps.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Inserts a draft reference for `student_id` pointing at `external_document_id`.
    async fn create(
        &self,
        student_id: Uuid,
        external_document_id: &str,
    ) -> Result<AchievementReference, StoreError>;

    /// Fails with `NotFound` when the row is absent or soft-deleted.
    async fn find_active(&self, id: Uuid) -> Result<ReferenceRecord, StoreError>;

    /// One page of non-deleted rows visible to the filter's scope, plus the total.
    async fn list_active(
        &self,
        filter: &ReferenceFilter,
    ) -> Result<(Vec<ReferenceRecord>, u64), StoreError>;

    /// Compare-and-set on status. Returns the number of rows written; zero
    /// means the row is missing, deleted, or no longer in `expected`.
    async fn set_status(
        &self,
        id: Uuid,
        expected: AchievementStatus,
        change: StatusChange,
    ) -> Result<u64, StoreError>;

    /// Marks the row deleted whatever its status. Idempotent.
    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn owner_user_id(&self, id: Uuid) -> Result<Uuid, StoreError>;

    async fn is_advisor_of(&self, lecturer_user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

/// Document store: achievement content.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the store-generated id.
    async fn insert(&self, doc: NewDocument) -> Result<String, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<AchievementDocument, StoreError>;

    /// Documents for the given ids; unknown ids are skipped.
    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementDocument>, StoreError>;

    async fn update_fields(&self, id: &str, patch: &DocumentPatch) -> Result<(), StoreError>;

    async fn append_attachment(&self, id: &str, attachment: &Attachment) -> Result<(), StoreError>;

    async fn set_points(&self, id: &str, points: i64) -> Result<(), StoreError>;

    /// Ids of documents whose title matches `pattern`, case-insensitively.
    async fn search_titles(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Hard delete, used only to compensate a failed paired create.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn student_by_user(&self, user_id: Uuid) -> Result<Option<StudentProfile>, StoreError>;

    async fn student(&self, id: Uuid) -> Result<Option<StudentProfile>, StoreError>;
}
