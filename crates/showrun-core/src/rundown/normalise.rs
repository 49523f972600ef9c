//! Rundown normalisation.
//!
//! Flattens the operator's tree (top-level order plus group children) into
//! `flat_order` and recomputes every derived field in one linear pass:
//! linked starts, end/duration per time strategy, day offsets, pending delays,
//! gaps, group spans and the custom field index.
//!
//! Normalising an already normalised rundown yields the same rundown.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::model::{Entry, EntryId, Rundown, TimeStrategy};
use crate::clock::wrap_day;
use crate::timer::calculate_duration;

/// Aggregates derived from a normalised rundown.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RundownMetadata {
    /// Sum of the durations of playable events.
    pub total_duration: i64,
    /// Sum of all delay entries not yet applied.
    pub total_delay: i64,
    /// Number of times the schedule crosses midnight.
    pub total_days: u32,
    /// Earliest playable start, time of day.
    pub first_start: Option<i64>,
    /// Latest playable end, time of day.
    pub last_end: Option<i64>,
    pub first_id: Option<EntryId>,
    pub last_id: Option<EntryId>,
    /// Events that will play, in order.
    pub playable_event_order: Vec<EntryId>,
    /// All events, in order.
    pub timed_event_order: Vec<EntryId>,
    /// Custom field label to the entries that carry a value for it.
    pub custom_fields: BTreeMap<String, Vec<EntryId>>,
}

impl RundownMetadata {
    /// Index of an event in the playable order.
    pub fn playable_index(&self, id: &str) -> Option<usize> {
        self.playable_event_order.iter().position(|e| e == id)
    }

    /// Playable event after `id`, or the first one when `id` is `None`.
    pub fn next_playable(&self, id: Option<&str>) -> Option<&EntryId> {
        match id {
            None => self.playable_event_order.first(),
            Some(id) => {
                let index = self.playable_index(id)?;
                self.playable_event_order.get(index + 1)
            }
        }
    }

    /// Playable event before `id`.
    pub fn previous_playable(&self, id: &str) -> Option<&EntryId> {
        let index = self.playable_index(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.playable_event_order.get(i))
    }
}

#[derive(Clone, Copy)]
struct PreviousPlayable {
    time_end: i64,
    normalised_end: i64,
}

struct GroupSpan {
    id: EntryId,
    start: Option<(i64, i64)>,
    end: Option<(i64, i64)>,
}

impl GroupSpan {
    fn new(id: EntryId) -> Self {
        Self {
            id,
            start: None,
            end: None,
        }
    }

    fn include(&mut self, start_tod: i64, start: i64, end_tod: i64, end: i64) {
        if self.start.map_or(true, |(_, s)| start < s) {
            self.start = Some((start_tod, start));
        }
        if self.end.map_or(true, |(_, e)| end > e) {
            self.end = Some((end_tod, end));
        }
    }

    fn flush(self, rundown: &mut Rundown) {
        if let Some(Entry::Group(group)) = rundown.entries.get_mut(&self.id) {
            group.time_start = self.start.map(|(tod, _)| tod);
            group.time_end = self.end.map(|(tod, _)| tod);
            group.duration = match (self.start, self.end) {
                (Some((_, s)), Some((_, e))) => e - s,
                _ => 0,
            };
        }
    }
}

/// Normalise a rundown in place and return its metadata.
pub fn normalise(rundown: &mut Rundown) -> RundownMetadata {
    rundown.flat_order = flatten(rundown);
    accumulate(rundown)
}

fn report_dangling(id: &str, parent: Option<&str>) {
    log::error!("[RUNDOWN] Dangling id '{}' (parent {:?}) skipped", id, parent);
    if cfg!(debug_assertions) {
        panic!("dangling id '{id}' in rundown order");
    }
}

/// Build the flat order and clean the tree of ids that cannot be resolved.
fn flatten(rundown: &mut Rundown) -> Vec<EntryId> {
    let order = std::mem::take(&mut rundown.order);
    let mut flat = Vec::with_capacity(rundown.entries.len());
    let mut seen: HashSet<EntryId> = HashSet::with_capacity(rundown.entries.len());
    let mut clean_order = Vec::with_capacity(order.len());

    for id in order {
        if !seen.insert(id.clone()) {
            log::warn!("[RUNDOWN] Duplicate id '{}' in order skipped", id);
            continue;
        }
        let children = match rundown.entries.get_mut(&id) {
            None => {
                report_dangling(&id, None);
                continue;
            }
            Some(Entry::Group(group)) => Some(group.entries.clone()),
            Some(entry) => {
                entry.set_parent(None);
                None
            }
        };
        flat.push(id.clone());

        if let Some(children) = children {
            let mut clean_children = Vec::with_capacity(children.len());
            for child_id in children {
                if !seen.insert(child_id.clone()) {
                    log::warn!("[RUNDOWN] Duplicate id '{}' in group '{}' skipped", child_id, id);
                    continue;
                }
                match rundown.entries.get_mut(&child_id) {
                    None => report_dangling(&child_id, Some(&id)),
                    Some(Entry::Group(_)) => {
                        log::error!("[RUNDOWN] Nested group '{}' in '{}' skipped", child_id, id);
                    }
                    Some(child) => {
                        child.set_parent(Some(id.clone()));
                        flat.push(child_id.clone());
                        clean_children.push(child_id);
                    }
                }
            }
            if let Some(Entry::Group(group)) = rundown.entries.get_mut(&id) {
                group.entries = clean_children;
            }
        }
        clean_order.push(id);
    }

    rundown.order = clean_order;

    let reachable: HashSet<&EntryId> = flat.iter().collect();
    let before = rundown.entries.len();
    rundown.entries.retain(|id, _| reachable.contains(id));
    if rundown.entries.len() != before {
        log::warn!(
            "[RUNDOWN] Pruned {} unreachable entries",
            before - rundown.entries.len()
        );
    }
    flat
}

/// Single pass over the flat order recomputing derived fields.
fn accumulate(rundown: &mut Rundown) -> RundownMetadata {
    let mut meta = RundownMetadata::default();
    let mut day: u32 = 0;
    let mut previous_start: Option<i64> = None;
    let mut previous_playable: Option<PreviousPlayable> = None;
    let mut scope: Option<EntryId> = None;
    let mut group_span: Option<GroupSpan> = None;
    let mut pending_delay = 0;
    let mut first: Option<(i64, i64, EntryId)> = None;
    let mut last: Option<(i64, i64, EntryId)> = None;

    let flat = rundown.flat_order.clone();
    for id in &flat {
        let Some(entry) = rundown.entries.get_mut(id) else {
            continue;
        };

        // entering or leaving a group is a delay boundary
        let entry_scope = match entry {
            Entry::Group(group) => Some(group.id.clone()),
            other => other.parent().map(str::to_owned),
        };
        if entry_scope != scope {
            pending_delay = 0;
            scope = entry_scope;
            if let Some(span) = group_span.take() {
                span.flush(rundown);
            }
            if let Some(Entry::Group(group)) = rundown.entries.get(id) {
                group_span = Some(GroupSpan::new(group.id.clone()));
            }
        }
        let Some(entry) = rundown.entries.get_mut(id) else {
            continue;
        };

        if let Some(custom) = entry.custom() {
            for (label, value) in custom {
                if !value.is_empty() {
                    meta.custom_fields
                        .entry(label.clone())
                        .or_default()
                        .push(id.clone());
                }
            }
        }

        match entry {
            Entry::Event(event) => {
                if event.link_start {
                    if let Some(previous) = previous_playable {
                        event.time_start = previous.time_end;
                    }
                }
                match event.time_strategy {
                    TimeStrategy::LockDuration => {
                        event.time_end = wrap_day(event.time_start + event.duration);
                    }
                    TimeStrategy::LockEnd => {
                        event.duration = calculate_duration(event.time_start, event.time_end);
                    }
                }
                if previous_start.is_some_and(|start| event.time_start < start) {
                    day += 1;
                }
                previous_start = Some(event.time_start);
                event.day_offset = day;
                event.delay = pending_delay;

                if event.skip {
                    event.gap = 0;
                } else {
                    let start = event.normalised_start();
                    let end = start + event.duration;
                    event.gap = match previous_playable {
                        Some(previous) if !event.link_start => start - previous.normalised_end,
                        _ => 0,
                    };
                    previous_playable = Some(PreviousPlayable {
                        time_end: event.time_end,
                        normalised_end: end,
                    });

                    let start_tod = event.delayed_start();
                    let end_tod = wrap_day(event.time_end + event.delay);
                    if first.as_ref().map_or(true, |(_, s, _)| start < *s) {
                        first = Some((start_tod, start, id.clone()));
                    }
                    if last.as_ref().map_or(true, |(_, e, _)| end >= *e) {
                        last = Some((end_tod, end, id.clone()));
                    }
                    if let Some(span) = group_span.as_mut() {
                        span.include(start_tod, start, end_tod, end);
                    }
                    meta.total_duration += event.duration;
                    meta.playable_event_order.push(id.clone());
                }
                meta.timed_event_order.push(id.clone());
            }
            Entry::Delay(delay) => {
                pending_delay += delay.duration;
                meta.total_delay += delay.duration;
            }
            Entry::Milestone(_) => {}
            Entry::Group(group) => {
                group.time_start = None;
                group.time_end = None;
                group.duration = 0;
            }
        }
    }

    if let Some(span) = group_span.take() {
        span.flush(rundown);
    }

    meta.total_days = day;
    if let Some((tod, _, id)) = first {
        meta.first_start = Some(tod);
        meta.first_id = Some(id);
    }
    if let Some((tod, _, id)) = last {
        meta.last_end = Some(tod);
        meta.last_id = Some(id);
    }
    meta
}
