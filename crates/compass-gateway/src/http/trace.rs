//! Trace-ID propagation and structured request logging.
//!
//! The trace middleware is the outermost layer so the logger (and every
//! handler) can read the ID from the request extensions.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

use compass_core::trace::{TraceId, TRACE_HEADER};

/// Honour an inbound `X-Trace-Id`, otherwise mint one; stash it in the
/// request extensions and echo it on the response.
pub async fn propagate_trace_id(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(TraceId::from_value)
        .unwrap_or_else(TraceId::generate);

    request.extensions_mut().insert(trace_id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}

/// One `http_request` info line per request.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let trace_id = request
        .extensions()
        .get::<TraceId>()
        .cloned()
        .unwrap_or_default();

    let start = Instant::now();
    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        trace_id = %trace_id,
        "http_request"
    );
    response
}
