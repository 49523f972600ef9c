//! Control and edit endpoints.
//!
//! Paths mirror the OSC addresses: `POST /api/start/cue/A1` does what
//! `/ontime/start/cue/A1` does.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use showrun_core::{parse_segments, ControlAction, RundownEdit};
use std::sync::Arc;

use crate::{
    models::{ActionResponse, EditResponse, ErrorResponse},
    routes::state::snapshot,
    AppState,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error((status, body): (StatusCode, ErrorResponse)) -> ApiError {
    (status, Json(body))
}

/// POST /api/:action - Action without arguments
pub async fn post_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    run_segments(state, vec![action]).await
}

/// POST /api/:action/*rest - Action with path arguments
pub async fn post_action_with_args(
    State(state): State<Arc<AppState>>,
    Path((action, rest)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut segments = vec![action];
    segments.extend(
        rest.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
    );
    run_segments(state, segments).await
}

async fn run_segments(
    state: Arc<AppState>,
    segments: Vec<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
    let action = parse_segments(&refs).map_err(|e| api_error(ErrorResponse::from_control(&e)))?;
    log::debug!("[HTTP] {}", action);
    let name = action.to_string();

    request(&state, action).await?;
    Ok(Json(ActionResponse {
        action: name,
        state: snapshot(&state),
    }))
}

/// Forward an action to the runtime thread off the async executor.
async fn request(state: &Arc<AppState>, action: ControlAction) -> Result<(), ApiError> {
    let handle = state.handle.clone();
    tokio::task::spawn_blocking(move || handle.request(action))
        .await
        .map_err(|e| {
            api_error((
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::internal(&format!("request task failed: {}", e)),
            ))
        })?
        .map_err(|e| api_error(ErrorResponse::from_engine(&e)))
}

/// POST /api/rundown - Apply a rundown edit
pub async fn edit_rundown(
    State(state): State<Arc<AppState>>,
    Json(edit): Json<RundownEdit>,
) -> Result<Json<EditResponse>, ApiError> {
    let handle = state.handle.clone();
    let created = tokio::task::spawn_blocking(move || handle.edit(edit))
        .await
        .map_err(|e| {
            api_error((
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::internal(&format!("edit task failed: {}", e)),
            ))
        })?
        .map_err(|e| api_error(ErrorResponse::from_engine(&e)))?;

    let revision = state.handle.with_state(|s| s.rundown.revision);
    Ok(Json(EditResponse { created, revision }))
}
