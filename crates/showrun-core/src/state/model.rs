//! Runtime state model.
//!
//! [`RuntimeState`] is the single mutable aggregate owned by the playback
//! engine. Everything observers see is a clone of it.

use serde::{Deserialize, Serialize};

use crate::aux_timer::AuxTimer;
use crate::offset::OffsetMode;
use crate::playback::{Playback, TimerPhase, TransitionGuards};
use crate::rundown::{EntryId, EventEntry, GroupEntry, Rundown, RundownMetadata};

/// Countdown of the loaded event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub added_time: i64,
    /// Remaining time, negative once overtime. `None` exactly when stopped.
    pub current: Option<i64>,
    pub duration: Option<i64>,
    pub elapsed: Option<i64>,
    pub expected_finish: Option<i64>,
    pub finished_at: Option<i64>,
    pub phase: TimerPhase,
    pub playback: Playback,
    /// Time until the pending roll event starts.
    pub secondary_timer: Option<i64>,
    pub started_at: Option<i64>,
}

/// Schedule drift. Negative means behind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetState {
    pub absolute: i64,
    pub relative: i64,
    pub mode: OffsetMode,
    pub expected_group_end: Option<i64>,
    pub expected_rundown_end: Option<i64>,
    pub expected_flag_start: Option<i64>,
}

impl OffsetState {
    /// The offset in the configured mode.
    pub fn active(&self) -> i64 {
        match self.mode {
            OffsetMode::Absolute => self.absolute,
            OffsetMode::Relative => self.relative,
        }
    }
}

/// Progress through the rundown.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub selected_event_index: Option<usize>,
    pub num_events: usize,
    pub planned_start: Option<i64>,
    pub planned_end: Option<i64>,
    pub actual_start: Option<i64>,
    pub expected_end: Option<i64>,
}

/// Baseline of the relative offset.
#[derive(Clone, Debug, PartialEq)]
pub struct RelativeAnchor {
    pub planned: i64,
    pub actual: i64,
    pub group: Option<EntryId>,
}

/// Bookkeeping that is never broadcast.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InternalState {
    pub paused_at: Option<i64>,
    /// Scheduled end a rolling event is held to.
    pub force_finish: Option<i64>,
    pub total_delay: i64,
    /// Event roll mode is waiting for.
    pub pending: Option<EntryId>,
    pub last_clock: Option<i64>,
    pub anchor: Option<RelativeAnchor>,
}

/// The canonical runtime aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub clock: i64,
    pub timer: TimerState,
    pub offset: OffsetState,
    pub event_now: Option<EventEntry>,
    pub event_next: Option<EventEntry>,
    pub group_now: Option<GroupEntry>,
    pub runtime: RuntimeInfo,
    #[serde(rename = "auxtimer1")]
    pub aux_timer: AuxTimer,
    #[serde(skip)]
    pub internal: InternalState,
}

impl RuntimeState {
    pub fn new(aux_timer_default: i64) -> Self {
        Self {
            aux_timer: AuxTimer::new(aux_timer_default),
            ..Default::default()
        }
    }

    /// Whether an event is loaded.
    pub fn is_loaded(&self) -> bool {
        self.event_now.is_some()
    }

    pub fn guards(&self) -> TransitionGuards {
        TransitionGuards::compute(self.timer.playback, self.timer.phase, self.is_loaded())
    }

    /// Check the playback and timer fields against each other.
    pub fn is_consistent(&self) -> bool {
        let stopped = self.timer.playback == Playback::Stop;
        let phase_none = self.timer.phase == TimerPhase::None;
        let pending_ok = (self.timer.phase == TimerPhase::Pending)
            == (self.timer.playback == Playback::Roll && self.internal.pending.is_some());
        stopped == phase_none && stopped == self.timer.current.is_none() && pending_ok
    }
}

/// Everything the runtime publishes to readers.
#[derive(Clone, Debug, Default)]
pub struct SharedState {
    pub runtime: RuntimeState,
    pub rundown: Rundown,
    pub metadata: RundownMetadata,
    /// Incremented on every publish.
    pub version: u64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_consistent() {
        let state = RuntimeState::new(1000);
        assert!(state.is_consistent());
        assert_eq!(state.aux_timer.duration, 1000);
    }

    #[test]
    fn test_inconsistency_detected() {
        let mut state = RuntimeState::default();
        state.timer.playback = Playback::Play;
        assert!(!state.is_consistent());
        state.timer.phase = TimerPhase::Default;
        state.timer.current = Some(10);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_internal_fields_not_serialised() {
        let mut state = RuntimeState::default();
        state.internal.paused_at = Some(5);
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("internal").is_none());
        assert!(json.get("auxtimer1").is_some());
        assert!(json["timer"].get("startedAt").is_some());
    }
}
