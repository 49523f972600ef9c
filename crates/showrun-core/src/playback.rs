//! Playback states, timer phases and transition guards.
//!
//! Guards are computed from the state rather than hardcoded at call sites so
//! that every adapter (HTTP, OSC, UI) asks the same question.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the playback engine is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Playback {
    /// Nothing loaded.
    #[default]
    Stop,
    /// An event is loaded and counting.
    Play,
    /// An event is loaded and frozen.
    Pause,
    /// Following the schedule autonomously.
    Roll,
}

impl fmt::Display for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Playback::Stop => "stop",
            Playback::Play => "play",
            Playback::Pause => "pause",
            Playback::Roll => "roll",
        };
        f.write_str(name)
    }
}

/// Why the timer numbers look the way they do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    #[default]
    None,
    Default,
    Warning,
    Danger,
    Overtime,
    /// Roll mode waiting for its first event.
    Pending,
}

impl Playback {
    /// Start is valid whenever an event is loaded.
    pub fn can_start(self, loaded: bool) -> bool {
        loaded
    }

    pub fn can_pause(self) -> bool {
        self == Playback::Play
    }

    /// Rolling into an overrun event is rejected.
    pub fn can_roll(self, phase: TimerPhase) -> bool {
        self != Playback::Roll && phase != TimerPhase::Overtime
    }

    pub fn can_stop(self) -> bool {
        self != Playback::Stop
    }

    /// Reload restarts the loaded event, so it needs one and must not be rolling.
    pub fn can_reload(self) -> bool {
        !matches!(self, Playback::Stop | Playback::Roll)
    }

    pub fn can_add_time(self) -> bool {
        matches!(self, Playback::Play | Playback::Pause)
    }

    /// Next/previous are operator navigation and do not apply while rolling.
    pub fn can_step(self) -> bool {
        self != Playback::Roll
    }
}

/// Snapshot of which operator actions are currently valid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionGuards {
    pub start: bool,
    pub pause: bool,
    pub roll: bool,
    pub stop: bool,
    pub reload: bool,
    pub add_time: bool,
    pub step: bool,
}

impl TransitionGuards {
    pub fn compute(playback: Playback, phase: TimerPhase, loaded: bool) -> Self {
        Self {
            start: playback.can_start(loaded),
            pause: playback.can_pause(),
            roll: playback.can_roll(phase),
            stop: playback.can_stop(),
            reload: playback.can_reload(),
            add_time: playback.can_add_time(),
            step: playback.can_step(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_guard() {
        assert!(!Playback::Stop.can_pause());
        assert!(Playback::Play.can_pause());
        assert!(!Playback::Pause.can_pause());
        assert!(!Playback::Roll.can_pause());
    }

    #[test]
    fn test_roll_guard() {
        assert!(!Playback::Roll.can_roll(TimerPhase::Default));
        assert!(!Playback::Play.can_roll(TimerPhase::Overtime));
        assert!(Playback::Play.can_roll(TimerPhase::Warning));
        assert!(Playback::Stop.can_roll(TimerPhase::None));
    }

    #[test]
    fn test_stop_and_reload_guards() {
        assert!(!Playback::Stop.can_stop());
        assert!(Playback::Roll.can_stop());
        assert!(!Playback::Stop.can_reload());
        assert!(!Playback::Roll.can_reload());
        assert!(Playback::Pause.can_reload());
    }

    #[test]
    fn test_start_needs_loaded_event() {
        for playback in [Playback::Stop, Playback::Play, Playback::Pause, Playback::Roll] {
            assert!(playback.can_start(true));
            assert!(!playback.can_start(false));
        }
    }

    #[test]
    fn test_guard_snapshot() {
        let guards = TransitionGuards::compute(Playback::Play, TimerPhase::Default, true);
        assert!(guards.pause && guards.stop && guards.roll && guards.add_time);
        let guards = TransitionGuards::compute(Playback::Stop, TimerPhase::None, false);
        assert!(!guards.pause && !guards.stop && !guards.start && guards.roll);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Playback::Roll).unwrap(), "\"roll\"");
        assert_eq!(serde_json::to_string(&TimerPhase::Overtime).unwrap(), "\"overtime\"");
    }
}
