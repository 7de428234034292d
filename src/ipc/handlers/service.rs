use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::super::{ApiError, IPCServer};

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub profile: String,
}

/// GET /api/service
pub async fn service_status(State(state): State<IPCServer>) -> impl IntoResponse {
    let name = &state.ctx.settings.service_name;
    let service_state = state.services.status(name).await;
    Json(json!({ "name": name, "state": service_state }))
}

/// POST /api/service/install: run a profile as the OS service
pub async fn install_service(
    State(state): State<IPCServer>,
    Json(req): Json<InstallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.ctx.profile(&req.profile)?;
    let settings = &state.ctx.settings;
    state
        .services
        .install(&settings.service_name, &profile, &settings.service_description)
        .await?;
    Ok(Json(json!({ "success": true, "name": settings.service_name, "profile": profile.name })))
}

/// POST /api/service/stop
pub async fn stop_service(State(state): State<IPCServer>) -> Result<impl IntoResponse, ApiError> {
    state.services.stop(&state.ctx.settings.service_name).await?;
    Ok(Json(json!({ "success": true })))
}

/// DELETE /api/service
pub async fn delete_service(State(state): State<IPCServer>) -> Result<impl IntoResponse, ApiError> {
    state.services.uninstall(&state.ctx.settings.service_name).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/autostart
pub async fn autostart_status(State(state): State<IPCServer>) -> impl IntoResponse {
    Json(json!({
        "enabled": state.autostart.is_enabled(),
        "value_name": state.autostart.value_name(),
    }))
}

/// PUT /api/autostart
pub async fn enable_autostart(State(state): State<IPCServer>) -> Result<impl IntoResponse, ApiError> {
    state.autostart.enable()?;
    Ok(Json(json!({ "success": true, "enabled": true })))
}

/// DELETE /api/autostart
pub async fn disable_autostart(State(state): State<IPCServer>) -> Result<impl IntoResponse, ApiError> {
    state.autostart.disable()?;
    Ok(Json(json!({ "success": true, "enabled": false })))
}
