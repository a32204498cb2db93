use std::mem;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};

use crate::{api, AppState};

#[derive(Copy, Clone)]
pub(crate) enum Stability {
    Stable,
    Beta,
}

impl Stability {
    fn as_str(self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Beta => "beta",
        }
    }
}

pub(crate) struct RouterBuilder {
    router: Router<AppState>,
    endpoints: Vec<String>,
    endpoints_meta: Vec<Value>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            endpoints: Vec::new(),
            endpoints_meta: Vec::new(),
        }
    }

    fn record(&mut self, method: &str, path: &'static str, stability: Stability) {
        self.endpoints.push(format!("{} {}", method, path));
        self.endpoints_meta.push(json!({
            "method": method,
            "path": path,
            "stability": stability.as_str(),
        }));
    }

    pub fn route_get<H, T>(&mut self, path: &'static str, handler: H, stability: Stability) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("GET", path, stability);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, get(handler));
        self
    }

    pub fn route_post<H, T>(&mut self, path: &'static str, handler: H, stability: Stability) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("POST", path, stability);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, post(handler));
        self
    }

    /// POST route with its own request body cap.
    pub fn route_post_limited<H, T>(
        &mut self,
        path: &'static str,
        handler: H,
        body_limit: usize,
        stability: Stability,
    ) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("POST", path, stability);
        let router = mem::take(&mut self.router);
        self.router = router.route(
            path,
            post(handler).layer(DefaultBodyLimit::max(body_limit)),
        );
        self
    }

    pub fn route_put<H, T>(&mut self, path: &'static str, handler: H, stability: Stability) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("PUT", path, stability);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, put(handler));
        self
    }

    pub fn route_delete<H, T>(
        &mut self,
        path: &'static str,
        handler: H,
        stability: Stability,
    ) -> &mut Self
    where
        H: Handler<T, AppState> + Clone + 'static,
        T: Send + 'static,
    {
        self.record("DELETE", path, stability);
        let router = mem::take(&mut self.router);
        self.router = router.route(path, delete(handler));
        self
    }

    pub fn build(self) -> (Router<AppState>, Vec<String>, Vec<Value>) {
        (self.router, self.endpoints, self.endpoints_meta)
    }
}

pub(crate) mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const ABOUT: &str = "/about";
    pub const ACHIEVEMENTS: &str = "/achievements";
    pub const ACHIEVEMENT: &str = "/achievements/{id}";
    pub const ACHIEVEMENT_SUBMIT: &str = "/achievements/{id}/submit";
    pub const ACHIEVEMENT_VERIFY: &str = "/achievements/{id}/verify";
    pub const ACHIEVEMENT_REJECT: &str = "/achievements/{id}/reject";
    pub const ACHIEVEMENT_HISTORY: &str = "/achievements/{id}/history";
    pub const ACHIEVEMENT_ATTACHMENTS: &str = "/achievements/{id}/attachments";
    pub const STUDENT_ACHIEVEMENTS: &str = "/students/{id}/achievements";
}

/// Multipart framing allowance on top of the attachment size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub(crate) fn build_router(max_upload_bytes: u64) -> (Router<AppState>, Vec<String>, Vec<Value>) {
    let upload_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut builder = RouterBuilder::new();
    builder.route_get(paths::HEALTHZ, api::meta::healthz, Stability::Stable);
    builder.route_get(paths::ABOUT, api::meta::about, Stability::Stable);
    builder.route_get(
        paths::ACHIEVEMENTS,
        api::achievements::achievements_list,
        Stability::Stable,
    );
    builder.route_post(
        paths::ACHIEVEMENTS,
        api::achievements::achievements_create,
        Stability::Stable,
    );
    builder.route_get(
        paths::ACHIEVEMENT,
        api::achievements::achievements_get,
        Stability::Stable,
    );
    builder.route_put(
        paths::ACHIEVEMENT,
        api::achievements::achievements_update,
        Stability::Stable,
    );
    builder.route_delete(
        paths::ACHIEVEMENT,
        api::achievements::achievements_delete,
        Stability::Stable,
    );
    builder.route_post(
        paths::ACHIEVEMENT_SUBMIT,
        api::achievements::achievements_submit,
        Stability::Stable,
    );
    builder.route_post(
        paths::ACHIEVEMENT_VERIFY,
        api::achievements::achievements_verify,
        Stability::Stable,
    );
    builder.route_post(
        paths::ACHIEVEMENT_REJECT,
        api::achievements::achievements_reject,
        Stability::Stable,
    );
    builder.route_get(
        paths::ACHIEVEMENT_HISTORY,
        api::achievements::achievements_history,
        Stability::Stable,
    );
    builder.route_post_limited(
        paths::ACHIEVEMENT_ATTACHMENTS,
        api::achievements::achievements_upload,
        upload_limit,
        Stability::Beta,
    );
    builder.route_get(
        paths::STUDENT_ACHIEVEMENTS,
        api::students::student_achievements,
        Stability::Beta,
    );
    builder.build()
}
