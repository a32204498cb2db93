//! Async store traits over the blocking SQLite handles.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use skp_core::model::{
    AchievementDocument, AchievementReference, AchievementStatus, Attachment, NewDocument,
    ReferenceRecord, StudentProfile,
};
use skp_core::query::ReferenceFilter;
use skp_core::request::DocumentPatch;
use skp_core::store::{DocumentStore, ReferenceStore, StatusChange, StudentDirectory};
use skp_core::StoreError;

use crate::{blocking, DocumentDb, ReferenceDb, TARGET};

fn achievement_missing(id: Uuid) -> StoreError {
    StoreError::NotFound(format!("achievement {id} not found"))
}

fn document_missing(id: &str) -> StoreError {
    StoreError::NotFound(format!("document {id} not found"))
}

#[async_trait]
impl ReferenceStore for ReferenceDb {
    async fn create(
        &self,
        student_id: Uuid,
        external_document_id: &str,
    ) -> Result<AchievementReference, StoreError> {
        let db = self.clone();
        let doc_id = external_document_id.to_string();
        Ok(blocking(move || db.create(student_id, &doc_id)).await?)
    }

    async fn find_active(&self, id: Uuid) -> Result<ReferenceRecord, StoreError> {
        let db = self.clone();
        blocking(move || db.find_active(id))
            .await?
            .ok_or_else(|| achievement_missing(id))
    }

    async fn list_active(
        &self,
        filter: &ReferenceFilter,
    ) -> Result<(Vec<ReferenceRecord>, u64), StoreError> {
        let db = self.clone();
        let filter = filter.clone();
        Ok(blocking(move || db.list_active(&filter)).await?)
    }

    async fn set_status(
        &self,
        id: Uuid,
        expected: AchievementStatus,
        change: StatusChange,
    ) -> Result<u64, StoreError> {
        let db = self.clone();
        let target = change.target();
        let rows = blocking(move || db.set_status(id, expected, &change)).await?;
        debug!(target: TARGET, achievement_id = %id, from = %expected, to = %target, rows, "status write");
        Ok(rows)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let db = self.clone();
        Ok(blocking(move || db.soft_delete(id)).await?)
    }

    async fn owner_user_id(&self, id: Uuid) -> Result<Uuid, StoreError> {
        let db = self.clone();
        blocking(move || db.owner_user_id(id))
            .await?
            .ok_or_else(|| achievement_missing(id))
    }

    async fn is_advisor_of(&self, lecturer_user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let db = self.clone();
        Ok(blocking(move || db.is_advisor_of(lecturer_user_id, id)).await?)
    }
}

#[async_trait]
impl StudentDirectory for ReferenceDb {
    async fn student_by_user(&self, user_id: Uuid) -> Result<Option<StudentProfile>, StoreError> {
        let db = self.clone();
        Ok(blocking(move || db.student_by_user(user_id)).await?)
    }

    async fn student(&self, id: Uuid) -> Result<Option<StudentProfile>, StoreError> {
        let db = self.clone();
        Ok(blocking(move || db.student(id)).await?)
    }
}

#[async_trait]
impl DocumentStore for DocumentDb {
    async fn insert(&self, doc: NewDocument) -> Result<String, StoreError> {
        let db = self.clone();
        Ok(blocking(move || db.insert(&doc)).await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<AchievementDocument, StoreError> {
        let db = self.clone();
        let key = id.to_string();
        blocking(move || db.find_by_id(&key))
            .await?
            .ok_or_else(|| document_missing(id))
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementDocument>, StoreError> {
        let db = self.clone();
        let ids = ids.to_vec();
        Ok(blocking(move || db.find_many(&ids)).await?)
    }

    async fn update_fields(&self, id: &str, patch: &DocumentPatch) -> Result<(), StoreError> {
        let db = self.clone();
        let key = id.to_string();
        let patch = patch.clone();
        if blocking(move || db.update_fields(&key, &patch)).await? {
            Ok(())
        } else {
            Err(document_missing(id))
        }
    }

    async fn append_attachment(&self, id: &str, attachment: &Attachment) -> Result<(), StoreError> {
        let db = self.clone();
        let key = id.to_string();
        let attachment = attachment.clone();
        if blocking(move || db.append_attachment(&key, &attachment)).await? {
            Ok(())
        } else {
            Err(document_missing(id))
        }
    }

    async fn set_points(&self, id: &str, points: i64) -> Result<(), StoreError> {
        let db = self.clone();
        let key = id.to_string();
        if blocking(move || db.set_points(&key, points)).await? {
            Ok(())
        } else {
            Err(document_missing(id))
        }
    }

    async fn search_titles(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let db = self.clone();
        let pattern = pattern.to_string();
        Ok(blocking(move || db.search_titles(&pattern)).await?)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let db = self.clone();
        let key = id.to_string();
        blocking(move || db.delete(&key)).await?;
        Ok(())
    }
}
