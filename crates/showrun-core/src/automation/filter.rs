//! Filter evaluation.

use super::fields::{resolve, FieldValue};
use super::model::{Automation, AutomationFilter, FilterOperator, FilterRule};
use crate::state::RuntimeState;

/// Whether the automation's filters pass. No filters always pass.
pub fn matches(automation: &Automation, state: &RuntimeState) -> bool {
    if automation.filters.is_empty() {
        return true;
    }
    let mut results = automation.filters.iter().map(|f| evaluate(f, state));
    match automation.filter_rule {
        FilterRule::All => results.all(|r| r),
        FilterRule::Any => results.any(|r| r),
    }
}

/// Evaluate one filter. Unknown paths never match.
pub fn evaluate(filter: &AutomationFilter, state: &RuntimeState) -> bool {
    match resolve(state, &filter.field) {
        Some(value) => compare(&value, filter.operator, &filter.value),
        None => {
            log::debug!("[AUTOMATION] Unknown filter field '{}'", filter.field);
            false
        }
    }
}

/// Compare a state value against the configured text, coerced by the
/// category of the state value.
pub fn compare(value: &FieldValue, operator: FilterOperator, expected: &str) -> bool {
    let expected = expected.trim();
    match value {
        // null only matches an explicit null comparison
        FieldValue::Null => {
            operator == FilterOperator::Equals && (expected.is_empty() || expected == "null")
        }
        FieldValue::Number(actual) => match expected.parse::<f64>() {
            Ok(expected) => match operator {
                FilterOperator::Equals => *actual == expected,
                FilterOperator::NotEquals => *actual != expected,
                FilterOperator::GreaterThan => *actual > expected,
                FilterOperator::LessThan => *actual < expected,
                FilterOperator::Contains | FilterOperator::NotContains => {
                    compare_text(&value.render(), operator, &expected.to_string())
                }
            },
            Err(_) => operator == FilterOperator::NotEquals,
        },
        FieldValue::Bool(actual) => match expected.parse::<bool>() {
            Ok(expected) => match operator {
                FilterOperator::Equals => *actual == expected,
                FilterOperator::NotEquals => *actual != expected,
                _ => false,
            },
            Err(_) => operator == FilterOperator::NotEquals,
        },
        FieldValue::Text(actual) => compare_text(actual, operator, expected),
    }
}

fn compare_text(actual: &str, operator: FilterOperator, expected: &str) -> bool {
    match operator {
        FilterOperator::Equals => actual == expected,
        FilterOperator::NotEquals => actual != expected,
        FilterOperator::Contains => actual.contains(expected),
        FilterOperator::NotContains => !actual.contains(expected),
        FilterOperator::GreaterThan | FilterOperator::LessThan => {
            match (actual.parse::<f64>(), expected.parse::<f64>()) {
                (Ok(a), Ok(e)) if operator == FilterOperator::GreaterThan => a > e,
                (Ok(a), Ok(e)) => a < e,
                _ => false,
            }
        }
    }
}
