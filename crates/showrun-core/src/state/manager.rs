//! Shared read access to the published state.
//!
//! The runtime thread is the only writer. HTTP handlers, the OSC server and
//! tests read through [`StateManager`].

use std::sync::{Arc, RwLock};

use super::model::{RuntimeState, SharedState};
use crate::playback::Playback;

/// Thread-safe handle on the published [`SharedState`].
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<SharedState>>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SharedState::new())),
        }
    }

    /// Read the state with a closure.
    pub fn with_state_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SharedState) -> R,
    {
        let state = self.state.read().expect("State lock poisoned");
        f(&state)
    }

    /// Write to the state with a closure.
    pub fn with_state_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SharedState) -> R,
    {
        let mut state = self.state.write().expect("State lock poisoned");
        f(&mut state)
    }

    /// Deep copy of the whole published state.
    pub fn snapshot(&self) -> SharedState {
        self.with_state_read(|s| s.clone())
    }

    /// Deep copy of the runtime aggregate only.
    pub fn runtime(&self) -> RuntimeState {
        self.with_state_read(|s| s.runtime.clone())
    }

    pub fn playback(&self) -> Playback {
        self.with_state_read(|s| s.runtime.timer.playback)
    }

    pub fn version(&self) -> u64 {
        self.with_state_read(|s| s.version)
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
