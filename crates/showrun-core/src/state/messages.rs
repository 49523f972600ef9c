//! Messages for the runtime thread.
//!
//! Every change to the runtime state is requested through [`EngineMessage`].
//! The runtime thread is the only place they are applied.

use crossbeam_channel::Sender;

use super::restore::RestorePoint;
use crate::automation::AutomationSettings;
use crate::broadcast::StoreUpdate;
use crate::control::ControlAction;
use crate::error::EngineError;
use crate::rundown::{EntryId, RundownEdit};

/// Reply channel for a request. `None` means fire and forget.
pub type Reply<T> = Option<Sender<Result<T, EngineError>>>;

/// Requests handled by the runtime thread.
#[derive(Debug)]
pub enum EngineMessage {
    // === Playback ===
    /// Apply an operator action.
    Control {
        action: ControlAction,
        reply: Reply<()>,
    },

    /// Re-seed playback from a restore point.
    Restore {
        point: RestorePoint,
        now_epoch: i64,
        reply: Reply<()>,
    },

    // === Rundown ===
    /// Apply a structural edit. Replies with the id of a created entry.
    Edit {
        edit: RundownEdit,
        reply: Reply<Option<EntryId>>,
    },

    // === Integrations ===
    /// Replace the automation settings.
    SetAutomation(AutomationSettings),

    /// Register a broadcast subscriber. It receives a full sync first.
    Subscribe(Sender<StoreUpdate>),
}
