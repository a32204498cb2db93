use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::request_ctx;

#[derive(Clone, Debug)]
struct Cfg {
    enabled: bool,
    sample_n: u64,
    trust_forward: bool,
}

static CFG: Lazy<Cfg> = Lazy::new(|| Cfg {
    enabled: std::env::var("SKP_ACCESS_LOG").ok().as_deref() == Some("1"),
    sample_n: std::env::var("SKP_ACCESS_SAMPLE_N")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
        .max(1),
    trust_forward: std::env::var("SKP_TRUST_FORWARD_HEADERS").ok().as_deref() == Some("1"),
});

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn first_forwarded_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let ip = raw.split(',').next().unwrap_or("").trim();
    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}

fn sampled(n: u64, sample_n: u64) -> bool {
    sample_n <= 1 || n % sample_n == 0
}

pub async fn access_log_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    if !CFG.enabled {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let connect_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip().to_string());
    let remote = if CFG.trust_forward {
        first_forwarded_ip(req.headers()).or(connect_ip)
    } else {
        connect_ip
    };
    let corr = request_ctx::context(&req);

    let res = next.run(req).await;
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    if !sampled(n, CFG.sample_n) {
        return res;
    }
    let mut obj = serde_json::json!({
        "ts": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "method": method.as_str(),
        "path": path,
        "status": res.status().as_u16(),
        "dur_ms": started.elapsed().as_millis() as u64,
    });
    if let Some(ip) = remote {
        obj["remote"] = serde_json::Value::String(ip);
    }
    if let Some(ctx) = corr {
        obj["request_id"] = serde_json::Value::String(ctx.request_id().to_string());
        obj["corr_id"] = serde_json::Value::String(ctx.corr_id().to_string());
    }
    tracing::info!(
        target: "http.access",
        "{}",
        serde_json::to_string(&obj).unwrap_or_else(|_| "{}".into())
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn forwarded_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.7, 172.16.0.1".parse().unwrap());
        assert_eq!(first_forwarded_ip(&headers).as_deref(), Some("10.0.0.7"));
        assert!(first_forwarded_ip(&HeaderMap::new()).is_none());
    }

    #[test]
    fn sampling_keeps_every_nth() {
        assert!(sampled(7, 1));
        assert!(!sampled(3, 4));
        assert!(sampled(8, 4));
    }
}
