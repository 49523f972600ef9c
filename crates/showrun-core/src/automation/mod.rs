//! Automations: lifecycle triggers, filters and outbound actions.
//!
//! # Architecture
//!
//! - [`AutomationSettings`] - triggers bound to automations, loaded from config
//! - [`resolve`] - looks up a dotted state path such as `eventNow.title`
//! - [`matches`] - evaluates an automation's filters against a snapshot
//! - [`render`] - substitutes `{{path}}` placeholders
//! - [`plan_outputs`] / [`AutomationDispatcher`] - render and send outputs

mod dispatch;
mod fields;
mod filter;
mod model;
mod template;

pub use dispatch::{plan_outputs, AutomationDispatcher, PlannedOutput};
pub use fields::{resolve, FieldValue};
pub use filter::{compare, evaluate, matches};
pub use model::{
    Automation, AutomationFilter, AutomationOutput, AutomationSettings, FilterOperator,
    FilterRule, TimerLifeCycle, Trigger,
};
pub use template::render;
