//! Per-request metrics

use aidboard_common::metrics::RequestMetrics;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

/// Record count and latency per route template, so `/api/projects/{id}`
/// stays one series regardless of the id
pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let timer = RequestMetrics::start(request.method().as_str(), &endpoint);
    let response = next.run(request).await;
    timer.finish(response.status().as_u16());

    response
}
