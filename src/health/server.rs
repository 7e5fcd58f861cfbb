use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{HealthReporter, HealthState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: HealthState,
    uptime_seconds: i64,
    last_successful_update: Option<i64>,
    consecutive_failures: u32,
    total_updates: u64,
    dry_run: bool,
}

async fn health(State(reporter): State<HealthReporter>) -> Response {
    let snap = reporter.snapshot();
    let body = HealthBody {
        status: snap.status,
        uptime_seconds: (Utc::now() - snap.started_at).num_seconds().max(0),
        last_successful_update: snap.last_success_ts,
        consecutive_failures: snap.consecutive_failures,
        total_updates: snap.total_successes,
        dry_run: snap.dry_run,
    };
    let code = if snap.status == HealthState::Ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

async fn ready() -> Json<serde_json::Value> {
    Json(json!({ "ready": true }))
}

pub fn router(reporter: HealthReporter) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(TraceLayer::new_for_http())
        .with_state(reporter)
}

/// Serve the health endpoints on `listener` until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    reporter: HealthReporter,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "health server listening");
    }

    axum::serve(listener, router(reporter))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("health server error")
}
