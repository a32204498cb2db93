//! Achievement workflow engine.
//!
//! Every operation touching both stores is a short saga: the reference store
//! owns state and authorization, the document store owns content. A paired
//! create that loses its reference write deletes the orphan document; later
//! writes are not rolled back, so a failed document write after a status
//! change leaves the reference ahead of the document and reports a storage
//! error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::attachment::{sanitize_filename, AttachmentPolicy, AttachmentSink, IncomingFile};
use crate::config::ListingConfig;
use crate::error::{StoreError, WorkflowError};
use crate::identity::{permissions, Identity, Role};
use crate::model::{AchievementDocument, AchievementStatus, Attachment, ReferenceRecord};
use crate::query::{ListMeta, ListParams, ListQuery, Page, ReferenceFilter, RoleScope};
use crate::request::{ensure_fits, CreateAchievementRequest, UpdateAchievementRequest};
use crate::store::{DocumentStore, ReferenceStore, StatusChange, StudentDirectory};
use crate::transition::{self, Transition};
use crate::view::{AchievementView, HistoryView};

const TARGET: &str = "skp::workflow";

#[derive(Clone)]
pub struct AchievementWorkflow {
    references: Arc<dyn ReferenceStore>,
    documents: Arc<dyn DocumentStore>,
    students: Arc<dyn StudentDirectory>,
    attachments: Arc<dyn AttachmentSink>,
    policy: AttachmentPolicy,
    listing: ListingConfig,
}

fn require_permission(identity: &Identity, permission: &str) -> Result<(), WorkflowError> {
    if identity.has_permission(permission) {
        Ok(())
    } else {
        Err(WorkflowError::forbidden(format!(
            "missing permission {permission}"
        )))
    }
}

fn require_owner(identity: &Identity, record: &ReferenceRecord) -> Result<(), WorkflowError> {
    if record.student_user_id == identity.user_id {
        Ok(())
    } else {
        Err(WorkflowError::forbidden(
            "only the owning student may change this achievement",
        ))
    }
}

impl AchievementWorkflow {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        documents: Arc<dyn DocumentStore>,
        students: Arc<dyn StudentDirectory>,
        attachments: Arc<dyn AttachmentSink>,
    ) -> Self {
        Self {
            references,
            documents,
            students,
            attachments,
            policy: AttachmentPolicy::default(),
            listing: ListingConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: AttachmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_listing(mut self, listing: ListingConfig) -> Self {
        self.listing = listing;
        self
    }

    pub fn policy(&self) -> &AttachmentPolicy {
        &self.policy
    }

    async fn require_advisor(
        &self,
        identity: &Identity,
        record: &ReferenceRecord,
    ) -> Result<(), WorkflowError> {
        let allowed = match identity.role {
            Role::Advisor => {
                self.references
                    .is_advisor_of(identity.user_id, record.reference.id)
                    .await?
            }
            Role::Student | Role::Admin => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(
                "only the student's advisor may decide on this achievement",
            ))
        }
    }

    async fn authorize_read(
        &self,
        identity: &Identity,
        record: &ReferenceRecord,
    ) -> Result<(), WorkflowError> {
        if record.student_user_id == identity.user_id {
            return Ok(());
        }
        let allowed = match identity.role {
            Role::Admin => true,
            Role::Student => false,
            Role::Advisor => {
                self.references
                    .is_advisor_of(identity.user_id, record.reference.id)
                    .await?
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(
                "not allowed to view this achievement",
            ))
        }
    }

    async fn load(&self, id: Uuid) -> Result<(ReferenceRecord, AchievementDocument), WorkflowError> {
        let record = self.references.find_active(id).await?;
        let doc = self
            .documents
            .find_by_id(&record.reference.external_document_id)
            .await?;
        Ok((record, doc))
    }

    async fn view(&self, id: Uuid) -> Result<AchievementView, WorkflowError> {
        let (record, doc) = self.load(id).await?;
        Ok(AchievementView::assemble(&record, doc))
    }

    /// Writes a status change guarded on the status we authorized against.
    async fn change_status(
        &self,
        record: &ReferenceRecord,
        event: Transition,
        change: StatusChange,
    ) -> Result<(), WorkflowError> {
        let id = record.reference.id;
        let rows = self
            .references
            .set_status(id, record.reference.status, change)
            .await?;
        if rows > 0 {
            return Ok(());
        }
        // Lost a race with another writer: report what is there now.
        match self.references.find_active(id).await {
            Ok(current) => Err(WorkflowError::InvalidState {
                current: current.reference.status,
                action: event.action(),
            }),
            Err(StoreError::NotFound(_)) => Err(WorkflowError::not_found(format!(
                "achievement {id} not found"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create(
        &self,
        identity: &Identity,
        request: CreateAchievementRequest,
    ) -> Result<AchievementView, WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_CREATE)?;
        let student = self
            .students
            .student_by_user(identity.user_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("student profile not found"))?;
        let new_doc = request.into_document(student.id.to_string())?;

        let doc_id = self.documents.insert(new_doc).await?;
        let reference = match self.references.create(student.id, &doc_id).await {
            Ok(r) => r,
            Err(err) => {
                error!(
                    target: TARGET,
                    document_id = %doc_id,
                    student_id = %student.id,
                    error = %err,
                    "reference insert failed; deleting orphan document"
                );
                if let Err(cleanup) = self.documents.delete(&doc_id).await {
                    error!(
                        target: TARGET,
                        document_id = %doc_id,
                        error = %cleanup,
                        "compensating document delete failed"
                    );
                }
                return Err(err.into());
            }
        };
        info!(
            target: TARGET,
            achievement_id = %reference.id,
            document_id = %doc_id,
            "achievement created"
        );
        self.view(reference.id).await
    }

    pub async fn get(&self, identity: &Identity, id: Uuid) -> Result<AchievementView, WorkflowError> {
        let (record, doc) = self.load(id).await?;
        self.authorize_read(identity, &record).await?;
        Ok(AchievementView::assemble(&record, doc))
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: Uuid,
        request: UpdateAchievementRequest,
    ) -> Result<AchievementView, WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_UPDATE)?;
        let record = self.references.find_active(id).await?;
        require_owner(identity, &record)?;
        transition::apply(record.reference.status, Transition::Edit)?;

        let patch = request.into_patch()?;
        let doc_id = record.reference.external_document_id.clone();
        let current = self.documents.find_by_id(&doc_id).await?;
        let kind = patch.achievement_type.unwrap_or(current.achievement_type);
        if let Some(details) = patch.details.clone().apply_to(current.details) {
            ensure_fits(&details, kind)?;
        }

        // Claim the row in its checked status so a concurrent submit wins cleanly.
        if record.reference.status == AchievementStatus::Rejected {
            self.change_status(&record, Transition::Edit, StatusChange::Reopened)
                .await?;
            info!(target: TARGET, achievement_id = %id, "rejected achievement reopened as draft");
        } else {
            self.change_status(&record, Transition::Edit, StatusChange::Edited)
                .await?;
        }
        self.documents.update_fields(&doc_id, &patch).await?;
        self.view(id).await
    }

    /// Soft delete. The document is kept for audit.
    pub async fn delete(&self, identity: &Identity, id: Uuid) -> Result<(), WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_DELETE)?;
        let record = self.references.find_active(id).await?;
        require_owner(identity, &record)?;
        transition::apply(record.reference.status, Transition::Delete)?;
        self.change_status(&record, Transition::Delete, StatusChange::Deleted)
            .await?;
        info!(target: TARGET, achievement_id = %id, "achievement deleted");
        Ok(())
    }

    pub async fn submit(&self, identity: &Identity, id: Uuid) -> Result<AchievementView, WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_CREATE)?;
        let record = self.references.find_active(id).await?;
        require_owner(identity, &record)?;
        transition::apply(record.reference.status, Transition::Submit)?;
        self.change_status(&record, Transition::Submit, StatusChange::Submitted)
            .await?;
        info!(target: TARGET, achievement_id = %id, "achievement submitted");
        self.view(id).await
    }

    pub async fn verify(
        &self,
        identity: &Identity,
        id: Uuid,
        points: i64,
    ) -> Result<AchievementView, WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_VERIFY)?;
        let record = self.references.find_active(id).await?;
        self.require_advisor(identity, &record).await?;
        transition::apply(record.reference.status, Transition::Verify)?;
        if points <= 0 {
            return Err(WorkflowError::validation("points must be greater than 0"));
        }

        self.change_status(
            &record,
            Transition::Verify,
            StatusChange::Verified {
                verifier: identity.user_id,
            },
        )
        .await?;
        let doc_id = &record.reference.external_document_id;
        if let Err(err) = self.documents.set_points(doc_id, points).await {
            warn!(
                target: TARGET,
                achievement_id = %id,
                document_id = %doc_id,
                points,
                error = %err,
                "achievement verified but points were not recorded"
            );
            return Err(WorkflowError::Storage(format!(
                "achievement verified but points were not recorded: {err}"
            )));
        }
        info!(target: TARGET, achievement_id = %id, points, "achievement verified");
        self.view(id).await
    }

    pub async fn reject(
        &self,
        identity: &Identity,
        id: Uuid,
        note: &str,
    ) -> Result<AchievementView, WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_VERIFY)?;
        let record = self.references.find_active(id).await?;
        self.require_advisor(identity, &record).await?;
        transition::apply(record.reference.status, Transition::Reject)?;
        let note = note.trim();
        if note.is_empty() {
            return Err(WorkflowError::validation("rejection_note is required"));
        }

        self.change_status(
            &record,
            Transition::Reject,
            StatusChange::Rejected {
                verifier: identity.user_id,
                note: note.to_string(),
            },
        )
        .await?;
        info!(target: TARGET, achievement_id = %id, "achievement rejected");
        self.view(id).await
    }

    pub async fn history(&self, identity: &Identity, id: Uuid) -> Result<HistoryView, WorkflowError> {
        let (record, doc) = self.load(id).await?;
        self.authorize_read(identity, &record).await?;
        Ok(HistoryView::assemble(&record, &doc))
    }

    pub async fn upload_attachment(
        &self,
        identity: &Identity,
        id: Uuid,
        file: IncomingFile,
    ) -> Result<Attachment, WorkflowError> {
        require_permission(identity, permissions::ACHIEVEMENT_CREATE)?;
        let record = self.references.find_active(id).await?;
        require_owner(identity, &record)?;
        transition::apply(record.reference.status, Transition::Attach)?;
        let file_type = self.policy.check(&file)?;

        let original = sanitize_filename(&file.filename);
        // One file per upload, even when two uploads share a filename.
        let stored_name = format!("{id}_{}_{original}", Uuid::new_v4().simple());
        let url = self.attachments.store(&stored_name, &file.bytes).await?;
        let attachment = Attachment {
            filename: original,
            url,
            file_type,
            uploaded_at: Utc::now(),
        };

        let doc_id = &record.reference.external_document_id;
        if let Err(err) = self.documents.append_attachment(doc_id, &attachment).await {
            error!(
                target: TARGET,
                achievement_id = %id,
                document_id = %doc_id,
                stored_name = %stored_name,
                error = %err,
                "attachment append failed; discarding stored file"
            );
            if let Err(cleanup) = self.attachments.discard(&stored_name).await {
                error!(
                    target: TARGET,
                    stored_name = %stored_name,
                    error = %cleanup,
                    "compensating file discard failed"
                );
            }
            return Err(err.into());
        }
        info!(
            target: TARGET,
            achievement_id = %id,
            stored_name = %stored_name,
            bytes = file.bytes.len(),
            "attachment stored"
        );
        Ok(attachment)
    }

    pub async fn list(
        &self,
        identity: &Identity,
        params: &ListParams,
    ) -> Result<Page<AchievementView>, WorkflowError> {
        let query = ListQuery::from_params(params, &self.listing);
        self.list_scoped(RoleScope::for_identity(identity), query)
            .await
    }

    /// Administrative listing of one student's achievements, drafts included.
    pub async fn list_for_student(
        &self,
        identity: &Identity,
        student_id: Uuid,
        params: &ListParams,
    ) -> Result<Page<AchievementView>, WorkflowError> {
        require_permission(identity, permissions::USER_MANAGE)?;
        let student = self
            .students
            .student(student_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("student {student_id} not found")))?;
        let query = ListQuery::from_params(params, &self.listing);
        self.list_scoped(RoleScope::Student(student.id), query)
            .await
    }

    async fn list_scoped(
        &self,
        scope: RoleScope,
        query: ListQuery,
    ) -> Result<Page<AchievementView>, WorkflowError> {
        let document_ids = match &query.search {
            Some(term) => {
                let ids = self.documents.search_titles(term).await?;
                if ids.is_empty() {
                    return Ok(Page {
                        items: Vec::new(),
                        meta: ListMeta::new(&query, 0),
                    });
                }
                Some(ids)
            }
            None => None,
        };

        let filter = ReferenceFilter {
            scope,
            document_ids,
            sort_by: query.sort_by,
            order: query.order,
            limit: query.limit,
            offset: query.offset(),
        };
        let (records, total) = self.references.list_active(&filter).await?;

        let ids: Vec<String> = records
            .iter()
            .map(|r| r.reference.external_document_id.clone())
            .collect();
        let mut docs: HashMap<String, AchievementDocument> = self
            .documents
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            match docs.remove(&record.reference.external_document_id) {
                Some(doc) => items.push(AchievementView::assemble(record, doc)),
                None => warn!(
                    target: TARGET,
                    achievement_id = %record.reference.id,
                    document_id = %record.reference.external_document_id,
                    "reference without document skipped in listing"
                ),
            }
        }
        Ok(Page {
            items,
            meta: ListMeta::new(&query, total),
        })
    }
}
