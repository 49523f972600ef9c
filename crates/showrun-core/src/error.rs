//! Error types for the showrun engine.
//!
//! The `Display` output of each variant doubles as the reason string
//! returned to control API callers.

use thiserror::Error;

use crate::playback::Playback;

/// Errors raised while editing or normalising a rundown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RundownError {
    /// An id does not exist in the rundown.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The entry exists but has the wrong kind for the operation.
    #[error("entry {id} is not a {expected}")]
    WrongKind { id: String, expected: &'static str },

    /// A set of entries cannot be grouped.
    #[error("invalid grouping: {0}")]
    InvalidGrouping(String),

    /// An entry with this id already exists.
    #[error("duplicate entry id: {0}")]
    DuplicateId(String),
}

/// Errors returned by playback operations.
///
/// None of these are fatal: a rejected action leaves the runtime state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The action is not valid in the current playback state.
    #[error("invalid transition: cannot {action} while {playback}")]
    InvalidTransition {
        action: &'static str,
        playback: Playback,
    },

    /// The referenced event does not exist or is not playable.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// The action needs a loaded event.
    #[error("no event loaded")]
    NoEventLoaded,

    /// There is no event in the requested direction.
    #[error("no {0} event")]
    NoTarget(&'static str),

    /// A restore point is too old to be trusted.
    #[error("restore point is stale ({age_ms} ms old)")]
    StaleRestorePoint { age_ms: i64 },

    /// A rundown edit failed.
    #[error(transparent)]
    Rundown(#[from] RundownError),

    /// The runtime thread is gone.
    #[error("runtime is not running")]
    Unavailable,
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while parsing inbound control messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The OSC address is not under `/ontime/`.
    #[error("address {0} is not an ontime address")]
    BadPrefix(String),

    /// The action name is not recognised.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// An argument is missing or cannot be parsed.
    #[error("bad argument for {action}: {reason}")]
    BadArgument { action: String, reason: String },
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("notification_rate ({notification}) must not be lower than update_rate ({update})")]
    RateOrder { update: u64, notification: u64 },
}
