//! showrun runtime - drives the playback engine from a dedicated thread.
//!
//! The runtime manages:
//! - The engine tick loop and scheduled finishes
//! - Message passing between adapters and the engine
//! - Change broadcasts and automation dispatch

pub mod thread;

pub use thread::{Runtime, RuntimeHandle};
