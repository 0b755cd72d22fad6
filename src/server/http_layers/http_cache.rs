//! HTTP caching middleware for the image routes.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::IntoResponse};

/// Stamp successful responses with a `Cache-Control: max-age` header so
/// clients and intermediaries hold on to served images. Error responses
/// stay uncached: a 404 may become a 200 after the next sync run.
pub async fn http_cache(
    State(max_age_sec): State<usize>,
    request: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let response = next.run(request).await.into_response();
    if !response.status().is_success() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    parts.headers.insert(
        "Cache-Control",
        format!("max-age={}", max_age_sec)
            .parse()
            .expect("static header value"),
    );
    axum::http::Response::from_parts(parts, body)
}
