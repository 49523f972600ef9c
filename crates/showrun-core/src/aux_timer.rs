//! Secondary stopwatch, independent of the rundown.

use serde::{Deserialize, Serialize};

use crate::playback::Playback;
use crate::timer::get_elapsed;

/// Counting direction of the aux timer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxDirection {
    #[default]
    CountDown,
    CountUp,
}

/// A free-running timer operated by hand.
///
/// Only `Stop`, `Play` and `Pause` are used for its playback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxTimer {
    pub duration: i64,
    pub current: i64,
    pub playback: Playback,
    pub direction: AuxDirection,
    #[serde(skip)]
    started_at: Option<i64>,
    /// Time counted before the last start.
    #[serde(skip)]
    banked: i64,
}

impl AuxTimer {
    pub fn new(duration: i64) -> Self {
        Self {
            duration,
            current: duration,
            playback: Playback::Stop,
            direction: AuxDirection::CountDown,
            started_at: None,
            banked: 0,
        }
    }

    pub fn start(&mut self, clock: i64) {
        if self.playback == Playback::Play {
            return;
        }
        self.started_at = Some(clock);
        self.playback = Playback::Play;
        self.update(clock);
    }

    pub fn pause(&mut self, clock: i64) {
        if self.playback != Playback::Play {
            return;
        }
        self.banked += self.started_at.map_or(0, |s| get_elapsed(s, clock));
        self.started_at = None;
        self.playback = Playback::Pause;
        self.update(clock);
    }

    pub fn stop(&mut self) {
        self.started_at = None;
        self.banked = 0;
        self.playback = Playback::Stop;
        self.current = self.initial();
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.duration = duration.max(0);
        if self.playback == Playback::Stop {
            self.current = self.initial();
        }
    }

    pub fn set_direction(&mut self, direction: AuxDirection) {
        self.direction = direction;
        if self.playback == Playback::Stop {
            self.current = self.initial();
        }
    }

    /// Recompute `current` for the given clock.
    pub fn update(&mut self, clock: i64) {
        if self.playback == Playback::Stop {
            return;
        }
        let counted = self.banked + self.started_at.map_or(0, |s| get_elapsed(s, clock));
        self.current = match self.direction {
            AuxDirection::CountDown => self.duration - counted,
            AuxDirection::CountUp => counted,
        };
    }

    fn initial(&self) -> i64 {
        match self.direction {
            AuxDirection::CountDown => self.duration,
            AuxDirection::CountUp => 0,
        }
    }
}

impl Default for AuxTimer {
    fn default() -> Self {
        Self::new(300_000)
    }
}
