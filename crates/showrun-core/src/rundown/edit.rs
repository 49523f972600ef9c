//! Structural rundown edits.
//!
//! Every edit validates its inputs before touching the rundown, bumps the
//! rundown revision and re-normalises.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::delay::{apply_delay, remove_from_tree};
use super::model::{EndAction, Entry, EntryId, GroupEntry, Rundown, TimeStrategy};
use super::normalise::{normalise, RundownMetadata};
use crate::error::RundownError;

/// Partial update of an event. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub cue: Option<String>,
    pub note: Option<String>,
    pub time_start: Option<i64>,
    pub time_end: Option<i64>,
    pub duration: Option<i64>,
    pub time_strategy: Option<TimeStrategy>,
    pub link_start: Option<bool>,
    pub count_to_end: Option<bool>,
    pub skip: Option<bool>,
    pub end_action: Option<EndAction>,
    pub time_warning: Option<i64>,
    pub time_danger: Option<i64>,
    pub flag: Option<bool>,
    /// Merged into the existing custom fields; empty values clear a field.
    pub custom: Option<BTreeMap<String, String>>,
}

/// A structural change to the rundown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RundownEdit {
    Replace {
        rundown: Box<Rundown>,
    },
    Add {
        entry: Entry,
        #[serde(default)]
        after: Option<EntryId>,
        #[serde(default)]
        parent: Option<EntryId>,
    },
    Remove {
        ids: Vec<EntryId>,
    },
    Move {
        id: EntryId,
        #[serde(default)]
        after: Option<EntryId>,
        #[serde(default)]
        parent: Option<EntryId>,
    },
    Group {
        ids: Vec<EntryId>,
        #[serde(default)]
        title: String,
    },
    Ungroup {
        id: EntryId,
    },
    PatchEvent {
        id: EntryId,
        patch: EventPatch,
    },
    SetSkip {
        id: EntryId,
        skip: bool,
    },
    ApplyDelay {
        id: EntryId,
    },
    DeleteCustomField {
        label: String,
    },
}

/// Result of a successful edit.
#[derive(Clone, Debug, PartialEq)]
pub struct EditOutcome {
    pub metadata: RundownMetadata,
    /// Id of an entry created by the edit.
    pub created: Option<EntryId>,
}

/// Apply an edit and re-normalise.
pub fn apply_edit(
    rundown: &mut Rundown,
    edit: RundownEdit,
    metadata: &RundownMetadata,
) -> Result<EditOutcome, RundownError> {
    let mut created = None;
    match edit {
        RundownEdit::Replace { rundown: replacement } => {
            replacement.check_references()?;
            let revision = rundown.revision;
            *rundown = *replacement;
            rundown.revision = rundown.revision.max(revision);
        }
        RundownEdit::Add {
            entry,
            after,
            parent,
        } => add_entry(rundown, entry, after.as_deref(), parent.as_deref())?,
        RundownEdit::Remove { ids } => remove_entries(rundown, &ids)?,
        RundownEdit::Move { id, after, parent } => {
            move_entry(rundown, &id, after.as_deref(), parent.as_deref())?
        }
        RundownEdit::Group { ids, title } => {
            created = Some(group_entries(rundown, &ids, title)?);
        }
        RundownEdit::Ungroup { id } => ungroup(rundown, &id)?,
        RundownEdit::PatchEvent { id, patch } => patch_event(rundown, &id, patch)?,
        RundownEdit::SetSkip { id, skip } => {
            patch_event(
                rundown,
                &id,
                EventPatch {
                    skip: Some(skip),
                    ..Default::default()
                },
            )?;
        }
        RundownEdit::ApplyDelay { id } => {
            return Ok(EditOutcome {
                metadata: apply_delay(rundown, &id)?.unwrap_or_else(|| metadata.clone()),
                created: None,
            });
        }
        RundownEdit::DeleteCustomField { label } => delete_custom_field(rundown, &label, metadata),
    }
    rundown.revision += 1;
    Ok(EditOutcome {
        metadata: normalise(rundown),
        created,
    })
}

fn siblings_mut<'a>(
    rundown: &'a mut Rundown,
    parent: Option<&str>,
) -> Result<&'a mut Vec<EntryId>, RundownError> {
    match parent {
        None => Ok(&mut rundown.order),
        Some(parent) => match rundown.entries.get_mut(parent) {
            Some(Entry::Group(group)) => Ok(&mut group.entries),
            Some(_) => Err(RundownError::WrongKind {
                id: parent.to_string(),
                expected: "group",
            }),
            None => Err(RundownError::EntryNotFound(parent.to_string())),
        },
    }
}

fn insert_after(
    list: &mut Vec<EntryId>,
    id: EntryId,
    after: Option<&str>,
) -> Result<(), RundownError> {
    match after {
        None => list.push(id),
        Some(after) => {
            let index = list
                .iter()
                .position(|e| e == after)
                .ok_or_else(|| RundownError::EntryNotFound(after.to_string()))?;
            list.insert(index + 1, id);
        }
    }
    Ok(())
}

fn add_entry(
    rundown: &mut Rundown,
    mut entry: Entry,
    after: Option<&str>,
    parent: Option<&str>,
) -> Result<(), RundownError> {
    let id = entry.id().to_string();
    if id.is_empty() || rundown.entries.contains_key(&id) {
        return Err(RundownError::DuplicateId(id));
    }
    if let Entry::Group(group) = &entry {
        if parent.is_some() {
            return Err(RundownError::InvalidGrouping(
                "groups cannot be nested".to_string(),
            ));
        }
        rundown.check_children(group)?;
    }
    insert_after(siblings_mut(rundown, parent)?, id.clone(), after)?;
    entry.set_parent(parent.map(str::to_owned));
    rundown.entries.insert(id, entry);
    Ok(())
}

fn remove_entries(rundown: &mut Rundown, ids: &[EntryId]) -> Result<(), RundownError> {
    if let Some(missing) = ids.iter().find(|id| !rundown.entries.contains_key(*id)) {
        return Err(RundownError::EntryNotFound(missing.clone()));
    }
    for id in ids {
        let Some(entry) = rundown.entries.get(id) else {
            // already removed with its group
            continue;
        };
        let parent = entry.parent().map(str::to_owned);
        let children = match entry {
            Entry::Group(group) => group.entries.clone(),
            _ => Vec::new(),
        };
        for child in children {
            rundown.entries.remove(&child);
        }
        remove_from_tree(rundown, id, parent.as_deref());
    }
    Ok(())
}

fn move_entry(
    rundown: &mut Rundown,
    id: &str,
    after: Option<&str>,
    parent: Option<&str>,
) -> Result<(), RundownError> {
    let entry = rundown
        .entries
        .get(id)
        .ok_or_else(|| RundownError::EntryNotFound(id.to_string()))?;
    if parent.is_some() && matches!(entry, Entry::Group(_)) {
        return Err(RundownError::InvalidGrouping(
            "groups cannot be nested".to_string(),
        ));
    }
    if after == Some(id) {
        return Ok(());
    }
    let current_parent = entry.parent().map(str::to_owned);

    // validate the destination before detaching
    let destination = siblings_mut(rundown, parent)?;
    if let Some(after) = after {
        if !destination.iter().any(|e| e == after) {
            return Err(RundownError::EntryNotFound(after.to_string()));
        }
    }

    siblings_mut(rundown, current_parent.as_deref())?.retain(|e| e != id);
    insert_after(siblings_mut(rundown, parent)?, id.to_string(), after)?;
    if let Some(entry) = rundown.entries.get_mut(id) {
        entry.set_parent(parent.map(str::to_owned));
    }
    Ok(())
}

fn group_entries(
    rundown: &mut Rundown,
    ids: &[EntryId],
    title: String,
) -> Result<EntryId, RundownError> {
    if ids.is_empty() {
        return Err(RundownError::InvalidGrouping("nothing to group".to_string()));
    }
    for id in ids {
        match rundown.entries.get(id) {
            None => return Err(RundownError::EntryNotFound(id.clone())),
            Some(Entry::Group(_)) => {
                return Err(RundownError::InvalidGrouping(format!(
                    "{id} is already a group"
                )))
            }
            Some(entry) if entry.parent().is_some() => {
                return Err(RundownError::InvalidGrouping(format!(
                    "{id} already belongs to a group"
                )))
            }
            Some(_) => {}
        }
    }

    // children keep their relative top-level order
    let mut children: Vec<(usize, EntryId)> = ids
        .iter()
        .filter_map(|id| rundown.order.iter().position(|e| e == id).map(|p| (p, id.clone())))
        .collect();
    children.sort_by_key(|(position, _)| *position);
    let insert_at = children.first().map_or(rundown.order.len(), |(p, _)| *p);

    let group_id = uuid::Uuid::new_v4().to_string();
    let mut group = GroupEntry::new(group_id.clone(), title);
    group.entries = children.into_iter().map(|(_, id)| id).collect();

    rundown.order.retain(|e| !group.entries.contains(e));
    rundown.order.insert(insert_at.min(rundown.order.len()), group_id.clone());
    for child in &group.entries {
        if let Some(entry) = rundown.entries.get_mut(child) {
            entry.set_parent(Some(group_id.clone()));
        }
    }
    rundown.entries.insert(group_id.clone(), Entry::Group(group));
    Ok(group_id)
}

fn ungroup(rundown: &mut Rundown, id: &str) -> Result<(), RundownError> {
    let children = match rundown.entries.get(id) {
        Some(Entry::Group(group)) => group.entries.clone(),
        Some(_) => {
            return Err(RundownError::WrongKind {
                id: id.to_string(),
                expected: "group",
            })
        }
        None => return Err(RundownError::EntryNotFound(id.to_string())),
    };
    let position = rundown
        .order
        .iter()
        .position(|e| e == id)
        .unwrap_or(rundown.order.len());
    rundown.order.retain(|e| e != id);
    for (offset, child) in children.iter().enumerate() {
        rundown.order.insert(position + offset, child.clone());
        if let Some(entry) = rundown.entries.get_mut(child) {
            entry.set_parent(None);
        }
    }
    rundown.entries.remove(id);
    Ok(())
}

fn patch_event(rundown: &mut Rundown, id: &str, patch: EventPatch) -> Result<(), RundownError> {
    let event = match rundown.entries.get_mut(id) {
        Some(Entry::Event(event)) => event,
        Some(_) => {
            return Err(RundownError::WrongKind {
                id: id.to_string(),
                expected: "event",
            })
        }
        None => return Err(RundownError::EntryNotFound(id.to_string())),
    };

    if let Some(title) = patch.title {
        event.title = title;
    }
    if let Some(cue) = patch.cue {
        event.cue = cue;
    }
    if let Some(note) = patch.note {
        event.note = note;
    }
    if let Some(time_strategy) = patch.time_strategy {
        event.time_strategy = time_strategy;
    }
    if let Some(time_start) = patch.time_start {
        event.time_start = time_start;
    }
    if let Some(time_end) = patch.time_end {
        event.time_end = time_end;
        // an explicit end only sticks when the end is authoritative
        if patch.duration.is_none() && event.time_strategy == TimeStrategy::LockDuration {
            event.duration = crate::timer::calculate_duration(event.time_start, time_end);
        }
    }
    if let Some(duration) = patch.duration {
        event.duration = duration.max(0);
    }
    if let Some(link_start) = patch.link_start {
        event.link_start = link_start;
    }
    if let Some(count_to_end) = patch.count_to_end {
        event.count_to_end = count_to_end;
    }
    if let Some(skip) = patch.skip {
        event.skip = skip;
    }
    if let Some(end_action) = patch.end_action {
        event.end_action = end_action;
    }
    if let Some(time_warning) = patch.time_warning {
        event.time_warning = time_warning;
    }
    if let Some(time_danger) = patch.time_danger {
        event.time_danger = time_danger;
    }
    if let Some(flag) = patch.flag {
        event.flag = flag;
    }
    if let Some(custom) = patch.custom {
        for (label, value) in custom {
            if value.is_empty() {
                event.custom.remove(&label);
            } else {
                event.custom.insert(label, value);
            }
        }
    }
    event.revision += 1;
    Ok(())
}

/// Clear a custom field from every entry that uses it.
fn delete_custom_field(rundown: &mut Rundown, label: &str, metadata: &RundownMetadata) {
    let Some(ids) = metadata.custom_fields.get(label) else {
        return;
    };
    for id in ids {
        if let Some(custom) = rundown.entries.get_mut(id).and_then(Entry::custom_mut) {
            custom.remove(label);
        }
    }
}
