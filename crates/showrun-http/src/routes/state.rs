//! Read-only endpoints.

use axum::{extract::State, Json};
use showrun_core::RestorePoint;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    models::{RundownResponse, StateResponse},
    AppState,
};

/// Build the state body from the published snapshot.
pub(crate) fn snapshot(state: &AppState) -> StateResponse {
    state.handle.with_state(|s| StateResponse {
        guards: s.runtime.guards(),
        state: s.runtime.clone(),
        version: s.version,
    })
}

/// GET /api/state - Runtime store snapshot
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(snapshot(&state))
}

/// GET /api/rundown - Rundown with its derived metadata
pub async fn get_rundown(State(state): State<Arc<AppState>>) -> Json<RundownResponse> {
    Json(state.handle.with_state(|s| RundownResponse {
        revision: s.rundown.revision,
        rundown: s.rundown.clone(),
        metadata: s.metadata.clone(),
    }))
}

/// GET /api/restore - Restore point for the current playback
pub async fn get_restore_point(State(state): State<Arc<AppState>>) -> Json<RestorePoint> {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Json(state.handle.restore_point(epoch))
}
