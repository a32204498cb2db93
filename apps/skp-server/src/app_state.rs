use std::sync::Arc;

use serde_json::Value;

use skp_core::AchievementWorkflow;

use crate::identity::IdentityRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    workflow: AchievementWorkflow,
    identities: Arc<IdentityRegistry>,
    endpoints: Arc<Vec<String>>,
    endpoints_meta: Arc<Vec<Value>>,
}

impl AppState {
    pub fn new(workflow: AchievementWorkflow, identities: Arc<IdentityRegistry>) -> Self {
        Self {
            workflow,
            identities,
            endpoints: Arc::new(Vec::new()),
            endpoints_meta: Arc::new(Vec::new()),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>, meta: Vec<Value>) -> Self {
        self.endpoints = Arc::new(endpoints);
        self.endpoints_meta = Arc::new(meta);
        self
    }

    pub fn workflow(&self) -> &AchievementWorkflow {
        &self.workflow
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn endpoints(&self) -> Arc<Vec<String>> {
        self.endpoints.clone()
    }

    pub fn endpoints_meta(&self) -> Arc<Vec<Value>> {
        self.endpoints_meta.clone()
    }
}
