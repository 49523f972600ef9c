//! Field paths into the runtime state.
//!
//! Filters and templates address state with dotted paths such as
//! `eventNow.title`. Paths resolve through fixed tables of accessors; an
//! unknown path resolves to `None`.

use crate::clock::format_hms;
use crate::rundown::{EventEntry, GroupEntry};
use crate::state::RuntimeState;

/// A resolved field, typed by category for comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    /// Text for template output. Null renders empty.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bool(b) => b.to_string(),
        }
    }

    /// Like [`render`](Self::render), with numbers read as milliseconds.
    pub fn render_human(&self) -> String {
        match self {
            FieldValue::Number(n) => format_hms(*n as i64),
            other => other.render(),
        }
    }
}

fn num(v: i64) -> FieldValue {
    FieldValue::Number(v as f64)
}

fn opt_num(v: Option<i64>) -> FieldValue {
    v.map_or(FieldValue::Null, num)
}

fn text(v: &str) -> FieldValue {
    FieldValue::Text(v.to_string())
}

type StateAccessor = fn(&RuntimeState) -> FieldValue;
type EventAccessor = fn(&EventEntry) -> FieldValue;
type GroupAccessor = fn(&GroupEntry) -> FieldValue;

const STATE_FIELDS: &[(&str, StateAccessor)] = &[
    ("clock", |s| num(s.clock)),
    ("timer.addedTime", |s| num(s.timer.added_time)),
    ("timer.current", |s| opt_num(s.timer.current)),
    ("timer.duration", |s| opt_num(s.timer.duration)),
    ("timer.elapsed", |s| opt_num(s.timer.elapsed)),
    ("timer.expectedFinish", |s| opt_num(s.timer.expected_finish)),
    ("timer.finishedAt", |s| opt_num(s.timer.finished_at)),
    ("timer.phase", |s| enum_text(&s.timer.phase)),
    ("timer.playback", |s| FieldValue::Text(s.timer.playback.to_string())),
    ("timer.secondaryTimer", |s| opt_num(s.timer.secondary_timer)),
    ("timer.startedAt", |s| opt_num(s.timer.started_at)),
    ("offset.absolute", |s| num(s.offset.absolute)),
    ("offset.relative", |s| num(s.offset.relative)),
    ("offset.mode", |s| enum_text(&s.offset.mode)),
    ("offset.expectedGroupEnd", |s| opt_num(s.offset.expected_group_end)),
    ("offset.expectedRundownEnd", |s| opt_num(s.offset.expected_rundown_end)),
    ("offset.expectedFlagStart", |s| opt_num(s.offset.expected_flag_start)),
    ("runtime.selectedEventIndex", |s| {
        opt_num(s.runtime.selected_event_index.map(|i| i as i64))
    }),
    ("runtime.numEvents", |s| num(s.runtime.num_events as i64)),
    ("runtime.plannedStart", |s| opt_num(s.runtime.planned_start)),
    ("runtime.plannedEnd", |s| opt_num(s.runtime.planned_end)),
    ("runtime.actualStart", |s| opt_num(s.runtime.actual_start)),
    ("runtime.expectedEnd", |s| opt_num(s.runtime.expected_end)),
    ("auxtimer1.current", |s| num(s.aux_timer.current)),
    ("auxtimer1.duration", |s| num(s.aux_timer.duration)),
    ("auxtimer1.playback", |s| FieldValue::Text(s.aux_timer.playback.to_string())),
];

const EVENT_FIELDS: &[(&str, EventAccessor)] = &[
    ("id", |e| text(&e.id)),
    ("cue", |e| text(&e.cue)),
    ("title", |e| text(&e.title)),
    ("note", |e| text(&e.note)),
    ("timeStart", |e| num(e.time_start)),
    ("timeEnd", |e| num(e.time_end)),
    ("duration", |e| num(e.duration)),
    ("delay", |e| num(e.delay)),
    ("gap", |e| num(e.gap)),
    ("flag", |e| FieldValue::Bool(e.flag)),
    ("skip", |e| FieldValue::Bool(e.skip)),
    ("countToEnd", |e| FieldValue::Bool(e.count_to_end)),
];

const GROUP_FIELDS: &[(&str, GroupAccessor)] = &[
    ("id", |g| text(&g.id)),
    ("title", |g| text(&g.title)),
    ("note", |g| text(&g.note)),
    ("timeStart", |g| opt_num(g.time_start)),
    ("timeEnd", |g| opt_num(g.time_end)),
    ("duration", |g| num(g.duration)),
];

fn enum_text<T: serde::Serialize>(value: &T) -> FieldValue {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => FieldValue::Text(s),
        _ => FieldValue::Null,
    }
}

fn lookup<T>(table: &[(&str, fn(&T) -> FieldValue)], key: &str, target: &T) -> Option<FieldValue> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, accessor)| accessor(target))
}

fn resolve_event(event: Option<&EventEntry>, rest: &str) -> Option<FieldValue> {
    if let Some(label) = rest.strip_prefix("custom.") {
        return Some(
            event
                .and_then(|e| e.custom.get(label))
                .map_or(FieldValue::Null, |v| text(v)),
        );
    }
    // validate the key even when nothing is loaded
    EVENT_FIELDS.iter().find(|(name, _)| *name == rest)?;
    match event {
        Some(event) => lookup(EVENT_FIELDS, rest, event),
        None => Some(FieldValue::Null),
    }
}

/// Resolve a dotted path against the state.
pub fn resolve(state: &RuntimeState, path: &str) -> Option<FieldValue> {
    let path = path.trim();
    if let Some(rest) = path.strip_prefix("eventNow.") {
        return resolve_event(state.event_now.as_ref(), rest);
    }
    if let Some(rest) = path.strip_prefix("eventNext.") {
        return resolve_event(state.event_next.as_ref(), rest);
    }
    if let Some(rest) = path.strip_prefix("groupNow.") {
        GROUP_FIELDS.iter().find(|(name, _)| *name == rest)?;
        return match &state.group_now {
            Some(group) => lookup(GROUP_FIELDS, rest, group),
            None => Some(FieldValue::Null),
        };
    }
    lookup(STATE_FIELDS, path, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::Playback;

    fn state() -> RuntimeState {
        let mut state = RuntimeState::default();
        state.clock = 1000;
        state.timer.playback = Playback::Play;
        state.timer.current = Some(65_000);
        state.event_now = Some(
            EventEntry::new("a", 0, 100)
                .with_title("Intro")
                .with_custom("camera", "2"),
        );
        state
    }

    #[test]
    fn test_resolve_scalars() {
        let state = state();
        assert_eq!(resolve(&state, "clock"), Some(FieldValue::Number(1000.0)));
        assert_eq!(
            resolve(&state, "timer.playback"),
            Some(FieldValue::Text("play".to_string()))
        );
        assert_eq!(resolve(&state, "timer.finishedAt"), Some(FieldValue::Null));
        assert_eq!(
            resolve(&state, "timer.phase"),
            Some(FieldValue::Text("none".to_string()))
        );
    }

    #[test]
    fn test_resolve_events() {
        let state = state();
        assert_eq!(
            resolve(&state, "eventNow.title"),
            Some(FieldValue::Text("Intro".to_string()))
        );
        assert_eq!(
            resolve(&state, "eventNow.custom.camera"),
            Some(FieldValue::Text("2".to_string()))
        );
        assert_eq!(resolve(&state, "eventNext.title"), Some(FieldValue::Null));
        assert_eq!(resolve(&state, "groupNow.title"), Some(FieldValue::Null));
    }

    #[test]
    fn test_unknown_paths() {
        let state = state();
        assert_eq!(resolve(&state, "eventNow.nope"), None);
        assert_eq!(resolve(&state, "timer"), None);
        assert_eq!(resolve(&state, "groupNow.entries"), None);
    }

    #[test]
    fn test_render() {
        assert_eq!(FieldValue::Number(65_000.0).render(), "65000");
        assert_eq!(FieldValue::Number(65_000.0).render_human(), "00:01:05");
        assert_eq!(FieldValue::Null.render(), "");
        assert_eq!(FieldValue::Number(1.5).render(), "1.5");
    }
}
