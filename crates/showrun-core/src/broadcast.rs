//! Change notifications for observers.
//!
//! The runtime state is split into tagged slices. [`Broadcaster`] remembers
//! the last payload sent for each tag and only emits slices that changed.
//! Payloads are serialised copies, so later mutation of the live state can
//! never reach a queued message.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::rundown::RundownMetadata;
use crate::state::RuntimeState;

/// Identifies a runtime-store slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreTag {
    #[serde(rename = "clock")]
    Clock,
    #[serde(rename = "timer")]
    Timer,
    #[serde(rename = "offset")]
    Offset,
    #[serde(rename = "runtime")]
    Runtime,
    #[serde(rename = "eventNow")]
    EventNow,
    #[serde(rename = "eventNext")]
    EventNext,
    #[serde(rename = "groupNow")]
    GroupNow,
    #[serde(rename = "auxtimer1")]
    AuxTimer1,
    #[serde(rename = "rundown")]
    Rundown,
}

impl StoreTag {
    pub const ALL: [StoreTag; 9] = [
        StoreTag::Clock,
        StoreTag::Timer,
        StoreTag::Offset,
        StoreTag::Runtime,
        StoreTag::EventNow,
        StoreTag::EventNext,
        StoreTag::GroupNow,
        StoreTag::AuxTimer1,
        StoreTag::Rundown,
    ];
}

/// Broadcast message: `{ tag, payload }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreUpdate {
    pub tag: StoreTag,
    pub payload: Value,
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        log::error!("[RUNTIME] Failed to serialise slice: {}", e);
        Value::Null
    })
}

/// Serialise every runtime slice.
pub fn runtime_slices(state: &RuntimeState) -> Vec<(StoreTag, Value)> {
    vec![
        (StoreTag::Clock, to_value(&state.clock)),
        (StoreTag::Timer, to_value(&state.timer)),
        (StoreTag::Offset, to_value(&state.offset)),
        (StoreTag::Runtime, to_value(&state.runtime)),
        (StoreTag::EventNow, to_value(&state.event_now)),
        (StoreTag::EventNext, to_value(&state.event_next)),
        (StoreTag::GroupNow, to_value(&state.group_now)),
        (StoreTag::AuxTimer1, to_value(&state.aux_timer)),
    ]
}

/// The rundown slice carries its revision and metadata. Clients fetch the
/// entries themselves when the revision moves.
pub fn rundown_slice(revision: u64, metadata: &RundownMetadata) -> (StoreTag, Value) {
    (
        StoreTag::Rundown,
        serde_json::json!({ "revision": revision, "metadata": to_value(metadata) }),
    )
}

/// Fan-out of changed slices to subscribers.
#[derive(Default)]
pub struct Broadcaster {
    last: HashMap<StoreTag, Value>,
    subscribers: Vec<Sender<StoreUpdate>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and send it every known slice.
    pub fn add_subscriber(&mut self, tx: Sender<StoreUpdate>) {
        for tag in StoreTag::ALL {
            if let Some(payload) = self.last.get(&tag) {
                let update = StoreUpdate {
                    tag,
                    payload: payload.clone(),
                };
                if tx.send(update).is_err() {
                    return;
                }
            }
        }
        self.subscribers.push(tx);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publish slices, emitting only those that changed. Returns the
    /// changed tags.
    pub fn publish(&mut self, slices: Vec<(StoreTag, Value)>) -> Vec<StoreTag> {
        let mut changed = Vec::new();
        for (tag, payload) in slices {
            if self.last.get(&tag) == Some(&payload) {
                continue;
            }
            self.last.insert(tag, payload.clone());
            self.send(StoreUpdate { tag, payload });
            changed.push(tag);
        }
        changed
    }

    fn send(&mut self, update: StoreUpdate) {
        let before = self.subscribers.len();
        self.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
        let dropped = before - self.subscribers.len();
        if dropped > 0 {
            log::debug!("[RUNTIME] Dropped {} disconnected subscribers", dropped);
        }
    }
}
