use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use hvac_common::{
    epoch_ms, ControllerConfig, HealthReport, Mode, OverrideManager, OverrideSource,
    TransitionGuard,
};

use crate::state::StateCell;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ControllerConfig>,
    pub cell: Arc<StateCell>,
    pub overrides: Arc<Mutex<OverrideManager>>,
    pub guard: Arc<Mutex<TransitionGuard>>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    mode: Mode,
    #[serde(default)]
    duration_minutes: Option<f64>,
    #[serde(default = "default_source")]
    source: OverrideSource,
}

fn default_source() -> OverrideSource {
    OverrideSource::Api
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/state", get(handle_get_state))
        .route("/override", post(handle_post_override))
        .route("/healthz", get(handle_healthz));

    app = match &state.config.log_path {
        Some(path) => app.route_service("/logs", ServeFile::new(path)),
        None => app.route("/logs", get(handle_logs_unconfigured)),
    };

    app.with_state(state)
}

async fn handle_get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cell.read().await)
}

async fn handle_post_override(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OverrideRequest>,
) -> axum::response::Response {
    let provided = headers.get("x-api-key").and_then(|value| value.to_str().ok());
    if state.config.api_key.is_empty() || provided != Some(state.config.api_key.as_str()) {
        warn!("unauthorized override request");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let duration_ms = match request.duration_minutes {
        Some(minutes) if !minutes.is_finite() || minutes <= 0.0 => {
            return error_response(StatusCode::BAD_REQUEST, "duration_minutes must be positive");
        }
        Some(minutes) => Some((minutes * 60_000.0).round() as u64),
        None => None,
    };

    let now_ms = epoch_ms();
    let installed = {
        let mut overrides = state.overrides.lock().await;
        match overrides.set(request.mode, duration_ms, request.source, now_ms) {
            Ok(installed) => installed,
            Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        }
    };

    // Reflect the override right away instead of waiting out a full
    // loop interval; the guard still gets the final say.
    let mode = { state.guard.lock().await.apply(installed.mode, now_ms) };
    let previous = state.cell.read().await;
    state
        .cell
        .publish(
            mode,
            installed,
            previous.last_temp_f,
            previous.last_motion_ts,
            now_ms,
        )
        .await;

    info!(
        "override installed: mode={} source={} expires_at={:?}",
        installed.mode.as_str(),
        installed.source.as_str(),
        installed.expires_at
    );
    (StatusCode::OK, Json(installed)).into_response()
}

async fn handle_healthz(State(state): State<AppState>) -> axum::response::Response {
    let now_ms = epoch_ms();
    let snapshot = state.cell.read().await;
    let fresh = state
        .cell
        .last_tick_ms()
        .map(|last| now_ms.saturating_sub(last) <= 2 * state.config.loop_interval_ms)
        .unwrap_or(false);

    let report = HealthReport {
        status: if fresh { "ok" } else { "error" },
        uptime_sec: state.cell.uptime_sec(),
        mode: snapshot.mode,
        last_temp_f: snapshot.last_temp_f,
        override_active: snapshot.override_state.active,
        errors: state.cell.error_count(),
    };

    let code = if fresh {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

async fn handle_logs_unconfigured() -> axum::response::Response {
    error_response(StatusCode::NOT_FOUND, "log_path is not configured")
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
