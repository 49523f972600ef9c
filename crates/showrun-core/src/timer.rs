//! Timer arithmetic.
//!
//! Pure functions over time-of-day milliseconds. Every function that compares
//! a start time against the clock is midnight-safe: a start time later than
//! the clock means the timer was started "yesterday".

use crate::clock::DAY_TO_MS;
use crate::playback::{Playback, TimerPhase};

/// Remaining time on a running timer.
///
/// Returns `None` when the timer has not started. `paused_time` is the length
/// of an ongoing pause, which keeps the countdown frozen while paused.
pub fn get_current(
    started_at: Option<i64>,
    duration: i64,
    added_time: i64,
    paused_time: i64,
    clock: i64,
) -> Option<i64> {
    let started_at = started_at?;
    let correct_day = if started_at > clock { DAY_TO_MS } else { 0 };
    Some(started_at + duration + added_time + paused_time - (clock + correct_day))
}

/// Remaining time for a timer that counts towards a fixed end time of day.
pub fn get_current_to_end(
    started_at: Option<i64>,
    time_end: i64,
    added_time: i64,
    paused_time: i64,
    clock: i64,
) -> Option<i64> {
    let started_at = started_at?;
    let mut target = time_end + added_time + paused_time;
    if time_end < started_at {
        target += DAY_TO_MS;
    }
    let clock = if started_at > clock {
        clock + DAY_TO_MS
    } else {
        clock
    };
    Some(target - clock)
}

/// Time elapsed since `started_at`.
///
/// A start later than the clock is taken to be on the previous day.
pub fn get_elapsed(started_at: i64, clock: i64) -> i64 {
    let elapsed = if started_at > clock {
        clock + DAY_TO_MS - started_at
    } else {
        clock - started_at
    };
    debug_assert!(
        elapsed >= 0,
        "negative elapsed time: started_at={started_at} clock={clock}"
    );
    elapsed.max(0)
}

/// Time of day at which the timer is expected to reach zero.
///
/// Once `finished_at` is recorded it is returned as is. The result is never
/// earlier than `started_at`, however much time has been removed.
pub fn get_expected_finish(
    started_at: Option<i64>,
    finished_at: Option<i64>,
    duration: i64,
    paused_time: i64,
    added_time: i64,
) -> Option<i64> {
    if let Some(finished_at) = finished_at {
        return Some(finished_at);
    }
    let started_at = started_at?;
    Some((started_at + duration + paused_time + added_time).max(started_at))
}

/// Duration between two times of day, crossing midnight if `end < start`.
pub fn calculate_duration(start: i64, end: i64) -> i64 {
    if end < start {
        end + DAY_TO_MS - start
    } else {
        end - start
    }
}

/// Derive the qualitative phase of the timer.
///
/// `pending` is set while roll mode waits for its first event.
pub fn get_timer_phase(
    playback: Playback,
    current: Option<i64>,
    time_warning: i64,
    time_danger: i64,
    pending: bool,
) -> TimerPhase {
    match playback {
        Playback::Stop => TimerPhase::None,
        Playback::Roll if pending => TimerPhase::Pending,
        Playback::Play | Playback::Pause | Playback::Roll => match current {
            None => TimerPhase::Default,
            Some(current) if current < 0 => TimerPhase::Overtime,
            Some(current) if current <= time_danger => TimerPhase::Danger,
            Some(current) if current <= time_warning => TimerPhase::Warning,
            Some(_) => TimerPhase::Default,
        },
    }
}
