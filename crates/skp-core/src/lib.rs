//! Achievement tracking core: domain model, lifecycle rules, store seams and
//! the workflow engine that ties a relational reference store to a document
//! store.

pub mod attachment;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod query;
pub mod request;
pub mod store;
pub mod transition;
pub mod view;
pub mod workflow;

pub use error::{StoreError, WorkflowError};
pub use identity::{permissions, Identity, Role};
pub use workflow::AchievementWorkflow;
