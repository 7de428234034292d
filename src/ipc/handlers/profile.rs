use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::super::{ApiError, IPCServer};
use crate::command_builder::{self, HostlistMethod};
use crate::supervisor::Role;

const DEFAULT_CONSOLE_COUNT: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    /// Profile INI; relative paths resolve against the base folder.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub role: Role,
    pub capture: bool,
    /// Block until the process exits and return its exit code.
    pub wait: bool,
}

impl Default for StartRequest {
    fn default() -> Self {
        Self {
            role: Role::Primary,
            capture: true,
            wait: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConsoleQuery {
    pub since: Option<u64>,
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub command: String,
    #[serde(default = "default_section_name")]
    pub name: String,
    #[serde(default = "default_method")]
    pub method: HostlistMethod,
}

fn default_section_name() -> String {
    "custom".to_string()
}

fn default_method() -> HostlistMethod {
    HostlistMethod::Blacklist
}

/// GET /api/profiles
pub async fn list_profiles(State(state): State<IPCServer>) -> impl IntoResponse {
    let profiles = state.ctx.profiles();
    Json(json!({
        "source": profiles.source(),
        "profiles": profiles.iter().collect::<Vec<_>>(),
    }))
}

/// POST /api/profiles/reload
pub async fn reload_profiles(
    State(state): State<IPCServer>,
    payload: Option<Json<ReloadRequest>>,
) -> Result<Response, ApiError> {
    let path = match payload.and_then(|Json(req)| req.path) {
        Some(path) => state.ctx.resolve_path(&path),
        None => state.ctx.default_config_path(),
    };
    let profiles = state.ctx.reload_profiles(&path)?;
    tracing::info!("Loaded {} profile(s) from {}", profiles.len(), path.display());
    Ok(Json(json!({
        "success": true,
        "source": path,
        "profiles": profiles.names(),
    }))
    .into_response())
}

/// POST /api/profile/:name/start
pub async fn start_profile(
    Path(name): Path<String>,
    State(state): State<IPCServer>,
    payload: Option<Json<StartRequest>>,
) -> Result<Response, ApiError> {
    let req = payload.map(|Json(req)| req).unwrap_or_default();
    let profile = state.ctx.profile(&name)?;

    if req.wait {
        let exit_code = state.supervisor.run_to_completion(req.role, &profile).await?;
        return Ok(Json(json!({ "success": true, "exit_code": exit_code })).into_response());
    }

    let handle = state.supervisor.start(req.role, &profile, req.capture).await?;
    Ok((StatusCode::OK, Json(json!({ "success": true, "process": handle }))).into_response())
}

/// POST /api/process/:role/stop
pub async fn stop_role(Path(role): Path<Role>, State(state): State<IPCServer>) -> impl IntoResponse {
    let outcome = state.supervisor.terminate(role).await;
    Json(json!({ "success": outcome.is_ok(), "result": outcome }))
}

/// POST /api/process/:role/acknowledge
pub async fn acknowledge_role(Path(role): Path<Role>, State(state): State<IPCServer>) -> impl IntoResponse {
    state.supervisor.acknowledge(role);
    Json(json!({ "success": true, "state": state.supervisor.state(role) }))
}

/// POST /api/stop
pub async fn stop_all(State(state): State<IPCServer>) -> impl IntoResponse {
    let report = state.shutdown.execute().await;
    Json(json!({ "success": report.all_succeeded(), "steps": report.steps }))
}

/// GET /api/status
pub async fn status(State(state): State<IPCServer>) -> impl IntoResponse {
    let service_name = &state.ctx.settings.service_name;
    let service_state = state.services.status(service_name).await;
    Json(json!({
        "processes": state.supervisor.status(),
        "service": { "name": service_name, "state": service_state },
        "profiles_loaded": state.ctx.profiles().len(),
        "autostart": state.autostart.is_enabled(),
    }))
}

/// GET /api/console?since=<id>&count=<n>
pub async fn console(State(state): State<IPCServer>, Query(query): Query<ConsoleQuery>) -> impl IntoResponse {
    let entries = match query.since {
        Some(since) => state.console.get_since(since),
        None => state.console.get_recent(query.count.unwrap_or(DEFAULT_CONSOLE_COUNT)),
    };
    Json(json!({ "entries": entries }))
}

/// POST /api/command/convert
pub async fn convert_command(Json(req): Json<ConvertRequest>) -> Result<Response, ApiError> {
    if req.command.trim().is_empty() {
        return Err(ApiError::BadRequest("command is empty".to_string()));
    }
    let section = command_builder::build_section(&req.command, &req.name, req.method);
    Ok(Json(json!({ "success": true, "section": section })).into_response())
}
