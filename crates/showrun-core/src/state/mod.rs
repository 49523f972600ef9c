//! Runtime state and the messages that drive it.
//!
//! # Architecture
//!
//! - [`RuntimeState`] - the single mutable aggregate owned by the engine
//! - [`EngineMessage`] - everything the runtime thread can be asked to do
//! - [`StateManager`] - thread-safe read access to the published state
//! - [`RestorePoint`] - minimal snapshot to resume after a restart

mod manager;
mod messages;
mod model;
mod restore;

pub use manager::StateManager;
pub use messages::{EngineMessage, Reply};
pub use model::{
    InternalState, OffsetState, RelativeAnchor, RuntimeInfo, RuntimeState, SharedState,
    TimerState,
};
pub use restore::RestorePoint;
