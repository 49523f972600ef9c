//! Rundown entry types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::RundownError;

/// Stable identifier of a rundown entry.
pub type EntryId = String;

/// How an event's duration relates to its start and end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStrategy {
    /// Duration is authoritative; the end follows the start.
    #[default]
    LockDuration,
    /// End is authoritative; the duration follows.
    LockEnd,
}

/// What happens when an event's timer reaches zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndAction {
    /// Keep counting into overtime.
    #[default]
    None,
    Stop,
    PlayNext,
}

/// A timed entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventEntry {
    pub id: EntryId,
    pub cue: String,
    pub title: String,
    pub note: String,
    pub time_start: i64,
    pub time_end: i64,
    pub duration: i64,
    pub time_strategy: TimeStrategy,
    /// Start when the previous event ends.
    pub link_start: bool,
    /// Count towards `time_end` instead of counting the duration.
    pub count_to_end: bool,
    pub skip: bool,
    pub end_action: EndAction,
    pub time_warning: i64,
    pub time_danger: i64,
    pub flag: bool,
    pub custom: BTreeMap<String, String>,
    pub parent: Option<EntryId>,
    pub revision: u32,
    /// Pending delay from preceding delay entries (derived).
    pub delay: i64,
    /// Signed idle time since the previous playable event (derived).
    pub gap: i64,
    /// Days after the first day of the rundown (derived).
    pub day_offset: u32,
}

impl Default for EventEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            cue: String::new(),
            title: String::new(),
            note: String::new(),
            time_start: 0,
            time_end: 0,
            duration: 0,
            time_strategy: TimeStrategy::LockDuration,
            link_start: false,
            count_to_end: false,
            skip: false,
            end_action: EndAction::None,
            time_warning: 120_000,
            time_danger: 60_000,
            flag: false,
            custom: BTreeMap::new(),
            parent: None,
            revision: 0,
            delay: 0,
            gap: 0,
            day_offset: 0,
        }
    }
}

impl EventEntry {
    /// Create an event with a start and duration.
    pub fn new(id: impl Into<EntryId>, time_start: i64, duration: i64) -> Self {
        Self {
            id: id.into(),
            time_start,
            time_end: time_start + duration,
            duration,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_cue(mut self, cue: impl Into<String>) -> Self {
        self.cue = cue.into();
        self
    }

    pub fn linked(mut self) -> Self {
        self.link_start = true;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn with_end_action(mut self, end_action: EndAction) -> Self {
        self.end_action = end_action;
        self
    }

    pub fn with_custom(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(label.into(), value.into());
        self
    }

    /// Start time with pending delay and day offset applied.
    pub fn normalised_start(&self) -> i64 {
        self.time_start + self.delay + i64::from(self.day_offset) * crate::clock::DAY_TO_MS
    }

    /// Start time of day with pending delay applied.
    pub fn delayed_start(&self) -> i64 {
        crate::clock::wrap_day(self.time_start + self.delay)
    }
}

/// A duration offset applied to the entries that follow it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelayEntry {
    pub id: EntryId,
    pub duration: i64,
    pub parent: Option<EntryId>,
}

/// An untimed marker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MilestoneEntry {
    pub id: EntryId,
    pub cue: String,
    pub title: String,
    pub note: String,
    pub custom: BTreeMap<String, String>,
    pub parent: Option<EntryId>,
    pub revision: u32,
}

/// A titled container of entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupEntry {
    pub id: EntryId,
    pub title: String,
    pub note: String,
    /// Child ids in playback order.
    pub entries: Vec<EntryId>,
    pub target_duration: Option<i64>,
    pub custom: BTreeMap<String, String>,
    pub revision: u32,
    /// Start of the first playable child (derived).
    pub time_start: Option<i64>,
    /// End of the last playable child (derived).
    pub time_end: Option<i64>,
    /// Span of the playable children (derived).
    pub duration: i64,
}

impl GroupEntry {
    pub fn new(id: impl Into<EntryId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// One item in a rundown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    Event(EventEntry),
    Delay(DelayEntry),
    Milestone(MilestoneEntry),
    Group(GroupEntry),
}

impl Entry {
    pub fn id(&self) -> &str {
        match self {
            Entry::Event(e) => &e.id,
            Entry::Delay(e) => &e.id,
            Entry::Milestone(e) => &e.id,
            Entry::Group(e) => &e.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Event(_) => "event",
            Entry::Delay(_) => "delay",
            Entry::Milestone(_) => "milestone",
            Entry::Group(_) => "group",
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            Entry::Event(e) => e.parent.as_deref(),
            Entry::Delay(e) => e.parent.as_deref(),
            Entry::Milestone(e) => e.parent.as_deref(),
            Entry::Group(_) => None,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntryId>) {
        match self {
            Entry::Event(e) => e.parent = parent,
            Entry::Delay(e) => e.parent = parent,
            Entry::Milestone(e) => e.parent = parent,
            Entry::Group(_) => {}
        }
    }

    pub fn custom(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Entry::Event(e) => Some(&e.custom),
            Entry::Milestone(e) => Some(&e.custom),
            Entry::Group(e) => Some(&e.custom),
            Entry::Delay(_) => None,
        }
    }

    pub(crate) fn custom_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        match self {
            Entry::Event(e) => Some(&mut e.custom),
            Entry::Milestone(e) => Some(&mut e.custom),
            Entry::Group(e) => Some(&mut e.custom),
            Entry::Delay(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventEntry> {
        match self {
            Entry::Event(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupEntry> {
        match self {
            Entry::Group(g) => Some(g),
            _ => None,
        }
    }
}

/// A rundown as edited by the operator.
///
/// `order` holds the top-level ids; groups hold their children. `flat_order`
/// is derived by the normaliser and is the only iteration order the engine uses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rundown {
    pub id: String,
    pub title: String,
    pub order: Vec<EntryId>,
    pub flat_order: Vec<EntryId>,
    pub entries: HashMap<EntryId, Entry>,
    pub revision: u64,
}

impl Rundown {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Append a top-level entry. Does not normalise.
    pub fn push(&mut self, entry: Entry) {
        let id = entry.id().to_string();
        self.order.push(id.clone());
        self.entries.insert(id, entry);
    }

    /// Append a group with its children. Does not normalise.
    pub fn push_group(&mut self, mut group: GroupEntry, children: Vec<Entry>) {
        group.entries = children.iter().map(|c| c.id().to_string()).collect();
        for mut child in children {
            child.set_parent(Some(group.id.clone()));
            self.entries.insert(child.id().to_string(), child);
        }
        self.push(Entry::Group(group));
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn event(&self, id: &str) -> Option<&EventEntry> {
        self.entries.get(id).and_then(Entry::as_event)
    }

    pub fn group(&self, id: &str) -> Option<&GroupEntry> {
        self.entries.get(id).and_then(Entry::as_group)
    }

    /// Position of an id in the flat order.
    pub fn flat_index(&self, id: &str) -> Option<usize> {
        self.flat_order.iter().position(|e| e == id)
    }

    /// Check that the order and every group's children resolve. Run on
    /// rundowns that arrive from outside before they are normalised.
    pub fn check_references(&self) -> Result<(), RundownError> {
        for id in &self.order {
            match self.entries.get(id) {
                None => return Err(RundownError::EntryNotFound(id.clone())),
                Some(Entry::Group(group)) => self.check_children(group)?,
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub(crate) fn check_children(&self, group: &GroupEntry) -> Result<(), RundownError> {
        match group.entries.iter().find(|c| !self.entries.contains_key(*c)) {
            Some(missing) => Err(RundownError::EntryNotFound(missing.clone())),
            None => Ok(()),
        }
    }
}
