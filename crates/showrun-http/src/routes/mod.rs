//! API route handlers.

pub mod actions;
pub mod state;
