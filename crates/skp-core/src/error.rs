use thiserror::Error;

use crate::model::AchievementStatus;

/// Failure reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Business-level failure surfaced by the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("cannot {action} an achievement in status {current}")]
    InvalidState {
        current: AchievementStatus,
        action: &'static str,
    },
    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        WorkflowError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        WorkflowError::NotFound(msg.into())
    }

    /// Stable machine-readable code, used as the `error` field of API envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::Unauthenticated(_) => "authentication_error",
            WorkflowError::Forbidden(_) => "authorization_error",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::InvalidState { .. } => "invalid_state",
            WorkflowError::Storage(_) => "storage_error",
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => WorkflowError::NotFound(what),
            StoreError::Conflict(what) => WorkflowError::Storage(format!("conflict: {what}")),
            StoreError::Backend(e) => WorkflowError::Storage(format!("{e:#}")),
        }
    }
}
