//! Rundown model, normalisation and edits.
//!
//! # Architecture
//!
//! - [`Rundown`] - the operator's tree of entries plus the derived flat order
//! - [`normalise`] - rebuilds every derived field after a change
//! - [`apply_delay`] - bakes a delay entry into the schedule
//! - [`RundownEdit`] - structural edits, each followed by re-normalisation

mod delay;
mod edit;
mod model;
mod normalise;

pub use delay::apply_delay;
pub use edit::{apply_edit, EditOutcome, EventPatch, RundownEdit};
pub use model::{
    DelayEntry, EndAction, Entry, EntryId, EventEntry, GroupEntry, MilestoneEntry, Rundown,
    TimeStrategy,
};
pub use normalise::{normalise, RundownMetadata};
