use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::super::{ApiError, IPCServer};
use crate::updater::{self, PreUpdateHook, UpdateRequest};

/// POST /api/updates/:name: stop everything, then fetch and place the
/// `[[updates]]` entry called `name`.
pub async fn apply_update(
    Path(name): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, ApiError> {
    let source = state
        .ctx
        .settings
        .update_source(&name)
        .ok_or_else(|| ApiError::NotFound(format!("no update source named '{}'", name)))?;

    let request = UpdateRequest {
        url: source.url.clone(),
        destination: state.ctx.resolve_path(&source.destination),
        extract: source.extract,
    };
    let hook: &dyn PreUpdateHook = state.shutdown.as_ref();
    let placed = updater::fetch_and_place(&state.http, &request, Some(hook)).await?;

    Ok(Json(json!({ "success": true, "update": name, "placed": placed })))
}
