//! Automation settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle moments automations can react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerLifeCycle {
    OnLoad,
    OnStart,
    OnPause,
    OnStop,
    /// Fired at the notification rate.
    OnUpdate,
    OnFinish,
}

impl fmt::Display for TimerLifeCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerLifeCycle::OnLoad => "onLoad",
            TimerLifeCycle::OnStart => "onStart",
            TimerLifeCycle::OnPause => "onPause",
            TimerLifeCycle::OnStop => "onStop",
            TimerLifeCycle::OnUpdate => "onUpdate",
            TimerLifeCycle::OnFinish => "onFinish",
        };
        f.write_str(name)
    }
}

/// Binds a lifecycle moment to an automation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub trigger: TimerLifeCycle,
    pub automation_id: String,
}

/// How filter results combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterRule {
    #[default]
    All,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
}

/// One condition on a state field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationFilter {
    /// Dotted path such as `eventNow.title`.
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

/// An outbound action. String fields accept `{{path}}` templates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AutomationOutput {
    #[serde(rename_all = "camelCase")]
    Osc {
        target_ip: String,
        target_port: u16,
        address: String,
        /// Whitespace separated; quoted strings keep their spaces.
        #[serde(default)]
        args: String,
    },
    Http {
        url: String,
    },
    /// An action applied to this runtime.
    Ontime {
        action: String,
        #[serde(default)]
        value: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filter_rule: FilterRule,
    #[serde(default)]
    pub filters: Vec<AutomationFilter>,
    #[serde(default)]
    pub outputs: Vec<AutomationOutput>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    pub enabled: bool,
    pub triggers: Vec<Trigger>,
    pub automations: BTreeMap<String, Automation>,
}

impl AutomationSettings {
    /// Automations bound to a lifecycle moment, in trigger order.
    pub fn automations_for(&self, cycle: TimerLifeCycle) -> impl Iterator<Item = &Automation> {
        let enabled = self.enabled;
        self.triggers
            .iter()
            .filter(move |t| enabled && t.trigger == cycle)
            .filter_map(|t| {
                let automation = self.automations.get(&t.automation_id);
                if automation.is_none() {
                    log::warn!(
                        "[AUTOMATION] Trigger '{}' references unknown automation '{}'",
                        t.id,
                        t.automation_id
                    );
                }
                automation
            })
    }
}
