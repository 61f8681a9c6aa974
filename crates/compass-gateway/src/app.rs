use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use compass_store::Store;

/// Shared state for the health endpoints.
pub struct AppState {
    pub started_at: Instant,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            started_at: Instant::now(),
            store,
        }
    }
}

/// Assemble the health router. Trace-ID propagation is the outermost layer
/// so the request logger and the handlers can read the ID.
pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/healthz", get(crate::http::health::healthz))
        .route("/readyz", get(crate::http::health::readyz))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum::middleware::from_fn(crate::http::trace::log_requests))
        .layer(axum::middleware::from_fn(
            crate::http::trace::propagate_trace_id,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use compass_core::trace::TRACE_HEADER;
    use compass_store::MemoryStore;
    use tower::ServiceExt;

    fn router() -> Router {
        let state = Arc::new(AppState::new(Arc::new(MemoryStore::new())));
        build_router(state, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn healthz_reports_ok_with_trace_id() {
        let response = router()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(TRACE_HEADER));

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "compass");
        assert!(body["trace_id"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body["uptime"].as_str().is_some());
    }

    #[tokio::test]
    async fn readyz_reports_ready_when_the_store_answers() {
        let response = router()
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn inbound_trace_id_is_echoed() {
        let response = router()
            .oneshot(
                Request::get("/healthz")
                    .header(TRACE_HEADER, "abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(TRACE_HEADER).unwrap(),
            &"abc123".parse::<axum::http::HeaderValue>().unwrap()
        );
    }
}
