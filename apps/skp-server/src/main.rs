use std::net::SocketAddr;

use tracing::{error, info, warn};

mod access_log;
mod api;
mod app_state;
mod bootstrap;
mod directory;
mod identity;
mod openapi;
mod request_ctx;
mod responses;
mod router;
mod security;
#[cfg(test)]
mod test_support;
mod uploads;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    match bootstrap::ensure_openapi_export() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(err) => {
            eprintln!("error: failed to write generated OPENAPI_OUT: {err}");
            std::process::exit(2);
        }
    }

    skp_otel::init();

    let service_cfg = match bootstrap::load_service_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let http_cfg = match bootstrap::http_config_from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };
    let bootstrap::BootstrapOutput { router, state } = match bootstrap::build(&service_cfg).await {
        Ok(out) => out,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    let app = bootstrap::attach_global_layers(bootstrap::attach_http_layers(
        bootstrap::attach_stateful_layers(router, state),
        http_cfg.concurrency_limit,
    ));

    let listener = match tokio::net::TcpListener::bind(http_cfg.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {err}", http_cfg.addr);
            std::process::exit(1);
        }
    };
    info!(addr = %http_cfg.addr, "listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!("SIGTERM handler unavailable: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
