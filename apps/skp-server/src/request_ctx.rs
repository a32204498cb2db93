use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tokio::task_local;
use uuid::Uuid;

pub(crate) const HEADER_CORR: &str = "x-skp-corr";
const HEADER_ALT_CORR: &str = "x-correlation-id";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
const MAX_ID_LEN: usize = 128;

task_local! {
    static REQ_CORR: RequestCorrelation;
}

#[derive(Clone, Debug)]
pub struct RequestCorrelation {
    request_id: String,
    corr_id: String,
}

impl RequestCorrelation {
    pub fn new<R: Into<String>, C: Into<String>>(request_id: R, corr_id: C) -> Self {
        Self {
            request_id: request_id.into(),
            corr_id: corr_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn corr_id(&self) -> &str {
        &self.corr_id
    }
}

/// Propagates or mints `x-request-id` and `x-skp-corr` for every request.
pub async fn correlation_mw(mut req: Request<Body>, next: Next) -> Response {
    let request_id_header = HeaderName::from_static(HEADER_REQUEST_ID);
    let corr_header = HeaderName::from_static(HEADER_CORR);

    let request_id = req
        .headers()
        .get(&request_id_header)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let corr_id = req
        .headers()
        .get(&corr_header)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_id)
        .or_else(|| {
            req.headers()
                .get(HeaderName::from_static(HEADER_ALT_CORR))
                .and_then(|value| value.to_str().ok())
                .and_then(normalize_id)
        })
        .unwrap_or_else(|| request_id.clone());

    let correlation = RequestCorrelation::new(request_id, corr_id);
    req.extensions_mut().insert(correlation.clone());

    REQ_CORR
        .scope(correlation.clone(), async move {
            let mut res = next.run(req).await;
            if res.headers().get(&request_id_header).is_none() {
                if let Ok(value) = HeaderValue::from_str(correlation.request_id()) {
                    res.headers_mut().insert(request_id_header.clone(), value);
                }
            }
            if res.headers().get(&corr_header).is_none() {
                if let Ok(value) = HeaderValue::from_str(correlation.corr_id()) {
                    res.headers_mut().insert(corr_header.clone(), value);
                }
            }
            res
        })
        .await
}

pub fn context<B>(req: &Request<B>) -> Option<RequestCorrelation> {
    req.extensions().get::<RequestCorrelation>().cloned()
}

pub fn current() -> Option<RequestCorrelation> {
    REQ_CORR.try_with(|ctx| ctx.clone()).ok()
}

fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(trimmed.len().min(MAX_ID_LEN));
    for ch in trimmed.chars() {
        if ch.is_control() {
            continue;
        }
        if out.len() >= MAX_ID_LEN {
            break;
        }
        out.push(ch);
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn normalize_id_trims_controls_and_limits_length() {
        assert_eq!(normalize_id("  abc  "), Some("abc".into()));
        assert!(normalize_id("   ").is_none());
        assert_eq!(normalize_id("a\u{0007}b\u{007f}c"), Some("abc".into()));
        let long = "x".repeat(MAX_ID_LEN + 24);
        assert_eq!(normalize_id(&long).unwrap().len(), MAX_ID_LEN);
    }

    #[tokio::test]
    async fn supplied_ids_are_exposed_and_echoed() {
        let app = Router::new()
            .route(
                "/",
                get(|| async move {
                    let ctx = current().expect("context available");
                    assert_eq!(ctx.corr_id(), "test-corr");
                    assert_eq!(ctx.request_id(), "req-xyz");
                    Response::new(Body::empty())
                }),
            )
            .layer(axum::middleware::from_fn(correlation_mw));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-skp-corr", "test-corr")
                    .header("x-request-id", "req-xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        assert_eq!(header("x-skp-corr").as_deref(), Some("test-corr"));
        assert_eq!(header("x-request-id").as_deref(), Some("req-xyz"));
    }

    #[tokio::test]
    async fn missing_ids_are_generated_and_corr_follows_request_id() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(correlation_mw));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(Uuid::parse_str(&request_id).is_ok());
        assert_eq!(
            response
                .headers()
                .get("x-skp-corr")
                .and_then(|v| v.to_str().ok()),
            Some(request_id.as_str())
        );
    }
}
