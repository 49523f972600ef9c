//! Schedule offset and gap consumption.
//!
//! The offset is the signed drift between the plan and what actually happened.
//! A negative offset means the show is running behind; a positive offset means
//! it is running ahead. Programmed gaps between entries can absorb a
//! behind-schedule offset, ahead-of-schedule time is never banked.

use serde::{Deserialize, Serialize};

use crate::clock::day_delta;

/// Which baseline the displayed offset is measured against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetMode {
    /// Measured against the planned times of day.
    #[default]
    Absolute,
    /// Measured against the plan re-anchored at an actual start.
    Relative,
}

/// Where the relative baseline is re-anchored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeReset {
    /// Anchored once, when the rundown starts.
    #[default]
    Rundown,
    /// Re-anchored whenever playback enters a new group.
    Group,
}

/// Time until an entry logically starts.
///
/// A linked entry has no start of its own and takes the raw offset. Otherwise
/// only the part of a behind-schedule offset that does not fit in the gap
/// preceding the entry delays it. Zero or positive means not yet started.
pub fn calculate_time_until_start(
    normalised_start: i64,
    total_gap: i64,
    is_linked_and_next: bool,
    clock: i64,
    offset: i64,
) -> i64 {
    if is_linked_and_next {
        return normalised_start - offset - clock;
    }
    let consumed_offset = (offset + total_gap).min(0);
    (normalised_start - consumed_offset) - clock
}

/// Absolute time at which an entry is expected to start.
pub fn get_expected_start(
    normalised_start: i64,
    total_gap: i64,
    is_linked_and_next: bool,
    clock: i64,
    offset: i64,
) -> i64 {
    clock + calculate_time_until_start(normalised_start, total_gap, is_linked_and_next, clock, offset)
}

/// Inputs for measuring the drift of the running event.
#[derive(Clone, Copy, Debug, Default)]
pub struct OffsetInputs {
    /// Planned start of the running event, time of day, including pending delay.
    pub planned_start: i64,
    /// When the running event actually started.
    pub started_at: i64,
    /// Remaining time; negative once overtime.
    pub current: i64,
    /// Length of an ongoing pause.
    pub paused_time: i64,
    pub added_time: i64,
}

/// Drift of the running event against its planned start.
///
/// Starting late, running overtime, pausing and adding time all push the show
/// further behind.
pub fn get_runtime_offset(inputs: &OffsetInputs) -> i64 {
    let start_offset = day_delta(inputs.planned_start, inputs.started_at);
    let overtime = inputs.current.min(0);
    start_offset + overtime - inputs.paused_time - inputs.added_time
}

/// Relative drift: the plan is re-anchored so that `anchor_planned` maps onto
/// `anchor_actual`.
pub fn get_relative_offset(inputs: &OffsetInputs, anchor_planned: i64, anchor_actual: i64) -> i64 {
    let rebased = OffsetInputs {
        planned_start: inputs.planned_start + day_delta(anchor_actual, anchor_planned),
        ..*inputs
    };
    get_runtime_offset(&rebased)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_until_start_consumes_behind_offset() {
        assert_eq!(calculate_time_until_start(150, 0, false, 150, -50), 50);
    }

    #[test]
    fn test_time_until_start_ignores_ahead_offset() {
        assert_eq!(calculate_time_until_start(150, 0, false, 100, 50), 50);
    }

    #[test]
    fn test_time_until_start_linked() {
        assert_eq!(calculate_time_until_start(150, 0, true, 100, 50), 0);
    }

    #[test]
    fn test_time_until_start_gap_absorbs() {
        assert_eq!(calculate_time_until_start(160, 50, false, 150, -40), 10);
        assert_eq!(calculate_time_until_start(160, 50, false, 150, -60), 20);
    }

    #[test]
    fn test_expected_start() {
        assert_eq!(get_expected_start(1000, 0, false, 500, -200), 1200);
        assert_eq!(get_expected_start(1000, 300, false, 500, -200), 1000);
    }

    #[test]
    fn test_runtime_offset_started_late() {
        let inputs = OffsetInputs {
            planned_start: 10_000,
            started_at: 15_000,
            current: 1000,
            ..Default::default()
        };
        assert_eq!(get_runtime_offset(&inputs), -5000);
    }

    #[test]
    fn test_runtime_offset_overtime_pause_and_added() {
        let inputs = OffsetInputs {
            planned_start: 10_000,
            started_at: 10_000,
            current: -2000,
            paused_time: 500,
            added_time: 1000,
        };
        assert_eq!(get_runtime_offset(&inputs), -3500);
    }

    #[test]
    fn test_relative_offset_rebases_plan() {
        // the show started 1h late; the second event started exactly 1h after its plan
        let hour = 3_600_000;
        let inputs = OffsetInputs {
            planned_start: 2 * hour,
            started_at: 3 * hour,
            current: 1000,
            ..Default::default()
        };
        assert_eq!(get_runtime_offset(&inputs), -hour);
        assert_eq!(get_relative_offset(&inputs, hour, 2 * hour), 0);
    }
}
