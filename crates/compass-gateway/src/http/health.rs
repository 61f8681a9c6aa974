//! Liveness and readiness probes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::{json, Value};

use compass_core::trace::TraceId;

use crate::app::AppState;

const SERVICE_NAME: &str = "compass";

/// The readiness probe must answer inside this bound.
const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// GET /healthz — liveness, always 200 while the process is serving.
pub async fn healthz(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
) -> Json<Value> {
    let uptime = Duration::from_secs(state.started_at.elapsed().as_secs());
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "trace_id": trace_id.as_str(),
        "uptime": humantime::format_duration(uptime).to_string(),
    }))
}

/// GET /readyz — 200 when the store answers the probe within the bound,
/// 503 otherwise.
pub async fn readyz(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
) -> impl IntoResponse {
    let store = state.store.clone();
    let probe = tokio::time::timeout(
        READINESS_TIMEOUT,
        tokio::task::spawn_blocking(move || store.ping()),
    )
    .await;

    let ready = matches!(probe, Ok(Ok(Ok(()))));
    if ready {
        (
            StatusCode::OK,
            Json(json!({ "status": "ready", "trace_id": trace_id.as_str() })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "trace_id": trace_id.as_str() })),
        )
    }
}
