//! Restore points.
//!
//! A restore point is the minimum needed to resurrect playback after a
//! restart. Where and how often it is written is up to the caller.

use serde::{Deserialize, Serialize};

use super::model::RuntimeState;
use crate::clock::DAY_TO_MS;
use crate::playback::Playback;
use crate::rundown::EntryId;

/// Serialisable playback snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePoint {
    pub playback: Playback,
    pub selected_event_id: Option<EntryId>,
    pub started_at: Option<i64>,
    pub added_time: i64,
    pub paused_at: Option<i64>,
    pub first_start: Option<i64>,
    /// Unix time in milliseconds when the point was taken.
    pub epoch: i64,
}

impl RestorePoint {
    pub fn from_state(state: &RuntimeState, epoch: i64) -> Self {
        Self {
            playback: state.timer.playback,
            selected_event_id: state.event_now.as_ref().map(|e| e.id.clone()),
            started_at: state.timer.started_at,
            added_time: state.timer.added_time,
            paused_at: state.internal.paused_at,
            first_start: state.runtime.actual_start,
            epoch,
        }
    }

    /// Age of the point at `now_epoch`.
    pub fn age(&self, now_epoch: i64) -> i64 {
        now_epoch - self.epoch
    }

    /// Points older than a day no longer describe the same show.
    pub fn is_stale(&self, now_epoch: i64) -> bool {
        self.age(now_epoch) > DAY_TO_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness() {
        let point = RestorePoint {
            epoch: 1_000,
            ..Default::default()
        };
        assert!(!point.is_stale(1_000 + DAY_TO_MS));
        assert!(point.is_stale(1_001 + DAY_TO_MS));
    }

    #[test]
    fn test_json_shape() {
        let point = RestorePoint {
            playback: Playback::Pause,
            selected_event_id: Some("a".to_string()),
            paused_at: Some(10),
            ..Default::default()
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["playback"], "pause");
        assert_eq!(json["selectedEventId"], "a");
        assert_eq!(json["pausedAt"], 10);
    }
}
