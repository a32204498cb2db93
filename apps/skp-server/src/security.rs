use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

fn add_hdr(h: &mut HeaderMap, name: &'static str, val: &str) {
    let name = HeaderName::from_static(name);
    if !h.contains_key(&name) {
        if let Ok(v) = HeaderValue::from_str(val) {
            h.insert(name, v);
        }
    }
}

/// Baseline security headers; handlers may set their own first.
pub async fn headers_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut res = next.run(req).await;
    let h = res.headers_mut();
    add_hdr(h, "x-content-type-options", "nosniff");
    add_hdr(h, "x-frame-options", "DENY");
    let refpol = std::env::var("SKP_REFERRER_POLICY").unwrap_or_else(|_| "no-referrer".into());
    add_hdr(h, "referrer-policy", &refpol);
    add_hdr(h, "cache-control", "no-store");
    if std::env::var("SKP_HSTS").ok().as_deref() == Some("1") {
        add_hdr(
            h,
            "strict-transport-security",
            "max-age=31536000; includeSubDomains",
        );
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn adds_headers_without_overriding_handler_values() {
        let app = Router::new()
            .route(
                "/",
                get(|| async { ([("cache-control", "max-age=60")], "ok").into_response() }),
            )
            .layer(axum::middleware::from_fn(headers_mw));
        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let h = res.headers();
        assert_eq!(h.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(h.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(h.get("cache-control").unwrap(), "max-age=60");
    }
}
