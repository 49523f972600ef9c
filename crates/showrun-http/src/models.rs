//! Request and response bodies.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use showrun_core::{
    ControlError, EngineError, EntryId, Rundown, RundownMetadata, RuntimeState, TransitionGuards,
};

/// Error body: `{ "error": "...", "code": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    fn new(code: &str, message: &str) -> Self {
        Self {
            error: message.to_string(),
            code: code.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("bad_request", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("not_found", message)
    }

    pub fn conflict(message: &str) -> Self {
        Self::new("conflict", message)
    }

    pub fn unavailable(message: &str) -> Self {
        Self::new("unavailable", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new("internal", message)
    }

    /// Status and body for a parse failure.
    pub fn from_control(err: &ControlError) -> (StatusCode, Self) {
        (StatusCode::BAD_REQUEST, Self::bad_request(&err.to_string()))
    }

    /// Status and body for a rejected engine request.
    pub fn from_engine(err: &EngineError) -> (StatusCode, Self) {
        let message = err.to_string();
        match err {
            EngineError::EventNotFound(_) => (StatusCode::NOT_FOUND, Self::not_found(&message)),
            EngineError::InvalidTransition { .. }
            | EngineError::NoEventLoaded
            | EngineError::NoTarget(_)
            | EngineError::StaleRestorePoint { .. } => {
                (StatusCode::CONFLICT, Self::conflict(&message))
            }
            EngineError::Rundown(_) => (StatusCode::BAD_REQUEST, Self::bad_request(&message)),
            EngineError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, Self::unavailable(&message))
            }
        }
    }
}

/// GET /api/state
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub state: RuntimeState,
    /// Which actions are currently accepted.
    pub guards: TransitionGuards,
    pub version: u64,
}

/// GET /api/rundown
#[derive(Debug, Clone, Serialize)]
pub struct RundownResponse {
    pub revision: u64,
    pub rundown: Rundown,
    pub metadata: RundownMetadata,
}

/// POST /api/rundown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse {
    pub created: Option<EntryId>,
    pub revision: u64,
}

/// POST /api/{action}
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub action: String,
    #[serde(flatten)]
    pub state: StateResponse,
}
