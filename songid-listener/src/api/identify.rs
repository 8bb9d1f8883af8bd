//! Identification status, trigger and listening settings endpoints
//!
//! - `GET /api/status`: what the presentation layer renders
//! - `POST /api/identify`: start an attempt (202, or 409 when rejected)
//! - `PUT /api/settings`: change enable flag, language or region

use crate::db::settings::save_listening_settings;
use crate::error::{ApiError, ApiResult};
use crate::services::{ListeningSettings, OrchestratorStatus, SettingsUpdate};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub token: u64,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.status())
}

/// POST /api/identify
pub async fn trigger_identification(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let token = state.orchestrator.trigger()?;
    info!(token = %token, "Identification triggered via API");
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            token: token.value(),
        }),
    ))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<ListeningSettings>> {
    for (field, value) in [("language", &update.language), ("region", &update.region)] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ApiError::BadRequest(format!("{} must not be blank", field)));
        }
    }

    let settings = state.orchestrator.update_settings(update);
    save_listening_settings(&state.db, &settings).await?;
    Ok(Json(settings))
}

pub fn identify_routes() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/identify", post(trigger_identification))
        .route("/api/settings", put(update_settings))
}
