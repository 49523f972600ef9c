//! Delay propagation.
//!
//! Applying a delay bakes its duration into the schedule of the events that
//! follow it, up to the next group boundary, and removes the delay entry.

use super::model::{Entry, Rundown};
use super::normalise::{normalise, RundownMetadata};
use crate::clock::DAY_TO_MS;
use crate::error::RundownError;

/// Apply the delay entry `delay_id`.
///
/// Returns the new metadata, or `None` when the delay has no duration and
/// nothing changed.
pub fn apply_delay(
    rundown: &mut Rundown,
    delay_id: &str,
) -> Result<Option<RundownMetadata>, RundownError> {
    let (duration, parent) = match rundown.get(delay_id) {
        None => return Err(RundownError::EntryNotFound(delay_id.to_string())),
        Some(Entry::Delay(delay)) => (delay.duration, delay.parent.clone()),
        Some(_) => {
            return Err(RundownError::WrongKind {
                id: delay_id.to_string(),
                expected: "delay",
            })
        }
    };
    if duration == 0 {
        return Ok(None);
    }
    let position = rundown
        .flat_index(delay_id)
        .ok_or_else(|| RundownError::EntryNotFound(delay_id.to_string()))?;

    let mut touched = 0;
    for id in rundown.flat_order[position + 1..].to_vec() {
        let Some(entry) = rundown.entries.get_mut(&id) else {
            continue;
        };
        if matches!(entry, Entry::Group(_)) || entry.parent() != parent.as_deref() {
            break;
        }
        if let Entry::Event(event) = entry {
            event.time_start = shift(event.time_start, duration);
            event.time_end = shift(event.time_end, duration);
            event.delay -= duration;
            event.revision += 1;
            touched += 1;
        }
    }

    remove_from_tree(rundown, delay_id, parent.as_deref());
    rundown.revision += 1;
    log::debug!(
        "[RUNDOWN] Applied delay '{}' ({} ms) to {} events",
        delay_id,
        duration,
        touched
    );
    Ok(Some(normalise(rundown)))
}

fn shift(time: i64, amount: i64) -> i64 {
    let shifted = time + amount;
    if shifted < 0 {
        0
    } else {
        shifted % DAY_TO_MS
    }
}

/// Detach an entry from its parent list and drop it from the map.
pub(crate) fn remove_from_tree(rundown: &mut Rundown, id: &str, parent: Option<&str>) {
    match parent.and_then(|p| rundown.entries.get_mut(p)) {
        Some(Entry::Group(group)) => group.entries.retain(|e| e != id),
        _ => rundown.order.retain(|e| e != id),
    }
    rundown.entries.remove(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rundown::model::{DelayEntry, EventEntry, GroupEntry};

    fn delay(id: &str, duration: i64) -> Entry {
        Entry::Delay(DelayEntry {
            id: id.to_string(),
            duration,
            parent: None,
        })
    }

    /// `[A, Delay(100), B, Group[C]]`
    fn sample(delay_ms: i64) -> Rundown {
        let mut rundown = Rundown::new("r", "Show");
        rundown.push(Entry::Event(EventEntry::new("a", 1000, 100)));
        rundown.push(delay("d", delay_ms));
        rundown.push(Entry::Event(EventEntry::new("b", 2000, 100)));
        rundown.push_group(
            GroupEntry::new("g", "Block"),
            vec![Entry::Event(EventEntry::new("c", 3000, 100))],
        );
        normalise(&mut rundown);
        rundown
    }

    #[test]
    fn test_delay_shifts_until_block() {
        let mut rundown = sample(100);
        let meta = apply_delay(&mut rundown, "d").unwrap().unwrap();

        let b = rundown.event("b").unwrap();
        assert_eq!((b.time_start, b.time_end), (2100, 2200));
        assert_eq!(b.delay, 0);
        assert_eq!(b.revision, 1);

        let c = rundown.event("c").unwrap();
        assert_eq!((c.time_start, c.time_end), (3000, 3100));
        assert_eq!(c.revision, 0);

        let a = rundown.event("a").unwrap();
        assert_eq!(a.time_start, 1000);

        assert!(rundown.get("d").is_none());
        assert_eq!(rundown.flat_order, vec!["a", "b", "g", "c"]);
        assert_eq!(meta.total_delay, 0);
    }

    #[test]
    fn test_zero_delay_is_noop() {
        let mut rundown = sample(0);
        let before = rundown.clone();
        assert_eq!(apply_delay(&mut rundown, "d").unwrap(), None);
        assert_eq!(rundown, before);
    }

    #[test]
    fn test_negative_delay_floors_at_zero() {
        let mut rundown = sample(-2500);
        apply_delay(&mut rundown, "d").unwrap();
        let b = rundown.event("b").unwrap();
        assert_eq!(b.time_start, 0);
    }

    #[test]
    fn test_delay_inside_group_stays_in_group() {
        let mut rundown = Rundown::new("r", "Show");
        rundown.push_group(
            GroupEntry::new("g1", "One"),
            vec![delay("d", 50), Entry::Event(EventEntry::new("a", 100, 10))],
        );
        rundown.push(Entry::Event(EventEntry::new("b", 200, 10)));
        normalise(&mut rundown);

        apply_delay(&mut rundown, "d").unwrap();
        assert_eq!(rundown.event("a").unwrap().time_start, 150);
        assert_eq!(rundown.event("b").unwrap().time_start, 200);
        assert!(rundown.group("g1").unwrap().entries == vec!["a"]);
    }

    #[test]
    fn test_apply_delay_errors() {
        let mut rundown = sample(100);
        assert_eq!(
            apply_delay(&mut rundown, "nope"),
            Err(RundownError::EntryNotFound("nope".to_string()))
        );
        assert!(matches!(
            apply_delay(&mut rundown, "a"),
            Err(RundownError::WrongKind { .. })
        ));
    }
}
