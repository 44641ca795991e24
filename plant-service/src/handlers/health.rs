use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::middleware::render_metrics;

pub const SERVICE_NAME: &str = "plant-service";

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "AI Plant Butler Server is running 🚀",
        "env": state.config.app.env,
        "debug": state.config.app.debug,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Liveness plus a summary of optional dependencies. Always 200.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let openai_key_present = state.config.openai.has_credential();
    let classifier_ready = state.analysis.diagnoser_ready();
    let guides_ready = state.analysis.guides_ready();
    let all_ok = openai_key_present && classifier_ready && guides_ready;

    Json(json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "app": "ok",
            "openai_key_present": openai_key_present,
            "classifier_ready": classifier_ready,
            "guides_ready": guides_ready
        }
    }))
}

/// 200 once the diagnosis backend and guide table are loaded, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.analysis.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "reasons": state.analysis.not_ready_reasons()
            })),
        )
    }
}

/// Non-secret configuration echo.
pub async fn env_info(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(json!({
        "app_env": config.app.env,
        "host": config.common.host,
        "port": config.common.port,
        "debug": config.app.debug,
        "cors_origins": config.cors_origins,
        "db_url_scheme": config.database.scheme(),
        "azure_openai_endpoint_set": config.azure.openai_endpoint.is_some(),
        "vision_backend": config.vision.backend.as_str(),
        "jwt_configured": config.auth.is_configured()
    }))
}

pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        render_metrics(),
    )
}
