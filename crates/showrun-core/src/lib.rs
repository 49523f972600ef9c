//! showrun core - timing engine for live show rundowns.
//!
//! This crate provides the building blocks of a show-control runtime:
//!
//! - **Clock** - time-of-day sources and midnight-safe arithmetic
//! - **Rundown** - events, delays, milestones and groups, plus normalisation and edits
//! - **Timer** - countdown, elapsed, expected finish and phase arithmetic
//! - **Offset** - schedule drift and expected start/end times
//! - **Engine** - the playback state machine (load, start, pause, stop, roll)
//! - **State** - the runtime store, restore points and engine messages
//! - **Broadcast** - change notifications per store slice
//! - **Automation** - lifecycle triggers with filters and OSC/HTTP outputs
//! - **Control** - inbound OSC and path-segment actions
//! - **Runtime** - the thread that ticks the engine and serves requests
//!
//! # Architecture
//!
//! All mutations flow through [`EngineMessage`] into the runtime thread,
//! which is the only owner of the [`PlaybackEngine`]. Readers see a copy of
//! the state through the [`StateManager`] and subscribe to [`StoreUpdate`]s.

pub mod aux_timer;
pub mod automation;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod offset;
pub mod osc;
pub mod playback;
pub mod rundown;
pub mod runtime;
pub mod state;
pub mod timer;

pub use aux_timer::{AuxDirection, AuxTimer};
pub use automation::{AutomationSettings, TimerLifeCycle};
pub use broadcast::{StoreTag, StoreUpdate};
pub use clock::{Clock, ManualClock, OffsetClock, SystemClock, DAY_TO_MS};
pub use config::EngineConfig;
pub use control::{parse_action, parse_osc, parse_segments, AuxAction, ControlAction, EventTarget};
pub use engine::{FinishTicket, PlaybackEngine, TickOutcome};
pub use error::{ConfigError, ControlError, EngineError, Result, RundownError};
pub use offset::{OffsetMode, RelativeReset};
pub use osc::{OscClient, OscControlServer};
pub use playback::{Playback, TimerPhase, TransitionGuards};
pub use rundown::{Entry, EntryId, EventEntry, GroupEntry, Rundown, RundownEdit, RundownMetadata};
pub use runtime::{Runtime, RuntimeHandle};
pub use state::{EngineMessage, RestorePoint, RuntimeState, SharedState, StateManager};
