use std::sync::Arc;

use tracing::{info, warn};
use utoipa::OpenApi;

use skp_core::attachment::AttachmentPolicy;
use skp_core::config::ServiceConfig;
use skp_core::AchievementWorkflow;
use skp_kernel::Kernel;

use crate::{
    access_log,
    app_state::AppState,
    directory::{self, DirectoryError, DirectoryFile},
    identity::IdentityRegistry,
    router::build_router,
    security,
    uploads::FsAttachmentSink,
};

pub(crate) struct BootstrapOutput {
    pub router: axum::Router<AppState>,
    pub state: AppState,
}

/// Startup failure that is not an HTTP binding problem.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("invalid service configuration: {0:#}")]
    Service(anyhow::Error),
    #[error("failed to open stores: {0:#}")]
    Kernel(anyhow::Error),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

pub(crate) fn load_service_config() -> Result<ServiceConfig, ConfigError> {
    ServiceConfig::discover().map_err(ConfigError::Service)
}

pub(crate) async fn build(cfg: &ServiceConfig) -> Result<BootstrapOutput, ConfigError> {
    let file = match &cfg.directory.path {
        Some(path) => {
            info!(target: "skp::http", path = %path.display(), "loading account directory");
            directory::load(path)?
        }
        None => {
            warn!(
                target: "skp::http",
                "no account directory configured; only SKP_ADMIN_TOKEN can authenticate"
            );
            DirectoryFile::default()
        }
    };
    build_with_directory(cfg, file).await
}

pub(crate) async fn build_with_directory(
    cfg: &ServiceConfig,
    file: DirectoryFile,
) -> Result<BootstrapOutput, ConfigError> {
    let kernel = Kernel::open(&cfg.storage.state_dir).map_err(ConfigError::Kernel)?;
    directory::seed(&kernel, &file).await?;
    let identities = Arc::new(IdentityRegistry::from_directory(&file));

    let sink = FsAttachmentSink::from_config(&cfg.uploads);
    let workflow = AchievementWorkflow::new(
        kernel.reference_store(),
        kernel.document_store(),
        kernel.student_directory(),
        Arc::new(sink.clone()),
    )
    .with_policy(AttachmentPolicy::from(&cfg.uploads))
    .with_listing(cfg.listing.clone());

    let (router, endpoints, endpoints_meta) = build_router(cfg.uploads.max_bytes);
    let router = if sink.url_prefix().starts_with('/') && sink.url_prefix().len() > 1 {
        router.nest_service(
            sink.url_prefix(),
            tower_http::services::ServeDir::new(sink.dir()),
        )
    } else {
        router
    };
    let state = AppState::new(workflow, identities).with_endpoints(endpoints, endpoints_meta);
    info!(
        target: "skp::http",
        state_dir = %cfg.storage.state_dir.display(),
        uploads_dir = %cfg.uploads.dir.display(),
        "stores ready"
    );
    Ok(BootstrapOutput { router, state })
}

pub(crate) fn attach_stateful_layers(
    router: axum::Router<AppState>,
    state: AppState,
) -> axum::Router<()> {
    router
        .with_state::<()>(state)
        .layer(axum::middleware::from_fn(access_log::access_log_mw))
        .layer(axum::middleware::from_fn(
            crate::request_ctx::correlation_mw,
        ))
}

pub(crate) fn attach_http_layers(
    router: axum::Router<()>,
    concurrency_limit: usize,
) -> axum::Router<()> {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    let router = if std::env::var("SKP_CORS_ANY").ok().as_deref() == Some("1") {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };
    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
}

pub(crate) fn attach_global_layers(router: axum::Router<()>) -> axum::Router<()> {
    router.layer(axum::middleware::from_fn(security::headers_mw))
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpConfigError {
    #[error("invalid SKP_HTTP_MAX_CONC: {0}")]
    InvalidConcurrency(String),
    #[error("invalid SKP_PORT: {0}")]
    InvalidPort(String),
    #[error("invalid SKP_BIND: {0}")]
    InvalidBind(String),
}

#[derive(Debug)]
pub(crate) struct HttpConfig {
    pub addr: std::net::SocketAddr,
    pub concurrency_limit: usize,
}

pub(crate) fn http_config_from_env() -> Result<HttpConfig, HttpConfigError> {
    let concurrency_limit = std::env::var("SKP_HTTP_MAX_CONC")
        .ok()
        .map(|raw| match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(HttpConfigError::InvalidConcurrency(raw)),
        })
        .transpose()?
        .unwrap_or(1024);

    let bind = std::env::var("SKP_BIND").unwrap_or_else(|_| "127.0.0.1".into());
    let port_raw = std::env::var("SKP_PORT").unwrap_or_else(|_| "3000".into());
    let port: u16 = port_raw
        .parse()
        .map_err(|_| HttpConfigError::InvalidPort(port_raw))?;

    let host = if bind.contains(':') && !bind.starts_with('[') {
        format!("[{bind}]")
    } else {
        bind.clone()
    };
    let addr = format!("{}:{}", host, port)
        .parse()
        .map_err(|_| HttpConfigError::InvalidBind(bind.clone()))?;

    Ok(HttpConfig {
        addr,
        concurrency_limit,
    })
}

pub(crate) fn ensure_openapi_export() -> Result<Option<String>, std::io::Error> {
    if let Ok(path) = std::env::var("OPENAPI_OUT") {
        export_openapi(&path)?;
        return Ok(Some(path));
    }
    Ok(None)
}

fn export_openapi(path: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = crate::openapi::ApiDoc::openapi()
        .to_yaml()
        .unwrap_or_else(|_| "openapi: 3.1.0".into());
    std::fs::write(path, yaml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env as test_env;

    #[test]
    fn http_config_defaults() {
        let mut guard = test_env::guard();
        guard.remove("SKP_BIND");
        guard.remove("SKP_PORT");
        guard.remove("SKP_HTTP_MAX_CONC");
        let cfg = http_config_from_env().unwrap();
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:3000");
        assert_eq!(cfg.concurrency_limit, 1024);
    }

    #[test]
    fn http_config_rejects_bad_values() {
        let mut guard = test_env::guard();
        guard.remove("SKP_BIND");
        guard.remove("SKP_HTTP_MAX_CONC");
        guard.set("SKP_PORT", "http");
        assert!(matches!(
            http_config_from_env(),
            Err(HttpConfigError::InvalidPort(_))
        ));

        guard.set("SKP_PORT", "8080");
        guard.set("SKP_HTTP_MAX_CONC", "0");
        assert!(matches!(
            http_config_from_env(),
            Err(HttpConfigError::InvalidConcurrency(_))
        ));

        guard.remove("SKP_HTTP_MAX_CONC");
        guard.set("SKP_BIND", "not an address");
        assert!(matches!(
            http_config_from_env(),
            Err(HttpConfigError::InvalidBind(_))
        ));
    }

    #[test]
    fn ipv6_bind_is_bracketed() {
        let mut guard = test_env::guard();
        guard.set("SKP_BIND", "::1");
        guard.set("SKP_PORT", "9000");
        guard.remove("SKP_HTTP_MAX_CONC");
        assert_eq!(http_config_from_env().unwrap().addr.to_string(), "[::1]:9000");
    }

    #[test]
    fn openapi_export_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("docs").join("openapi.yaml");
        let mut guard = test_env::guard();
        guard.set("OPENAPI_OUT", out.display().to_string());
        let written = ensure_openapi_export().unwrap();
        assert_eq!(written.as_deref(), Some(out.display().to_string().as_str()));
        let yaml = std::fs::read_to_string(&out).unwrap();
        assert!(yaml.contains("/achievements/{id}/submit"));
    }
}
