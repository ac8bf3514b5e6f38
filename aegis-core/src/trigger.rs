//! Trigger condition evaluation.
//!
//! `evaluate` is a pure function over an alert snapshot and a condition
//! tree: no I/O, no side effects, deterministic. Unknown attribute
//! references make the enclosing predicate unsatisfied rather than raising.
//! Depth is capped at playbook save time via `validate` and enforced again
//! during evaluation so a malformed stored condition can never recurse
//! unboundedly.

use serde_json::Value;

use crate::error::{AegisError, AegisResult};
use crate::models::{Alert, TriggerCondition};

/// Maximum expression tree depth accepted at playbook save time.
pub const MAX_CONDITION_DEPTH: usize = 32;

/// Decide whether `condition` is satisfied by `alert`.
pub fn evaluate(alert: &Alert, condition: &TriggerCondition) -> bool {
    evaluate_at(alert, condition, 0)
}

/// Reject over-deep or empty-composite conditions. Called when a playbook is
/// saved or loaded, never at run time.
pub fn validate(condition: &TriggerCondition) -> AegisResult<()> {
    let depth = condition.depth();
    if depth > MAX_CONDITION_DEPTH {
        return Err(AegisError::InvalidTriggerCondition(format!(
            "condition depth {} exceeds maximum {}",
            depth, MAX_CONDITION_DEPTH
        )));
    }
    validate_nodes(condition)
}

fn validate_nodes(condition: &TriggerCondition) -> AegisResult<()> {
    match condition {
        TriggerCondition::Equals { field, .. } | TriggerCondition::InSet { field, .. } => {
            if field.trim().is_empty() {
                return Err(AegisError::InvalidTriggerCondition(
                    "predicate field must not be empty".to_string(),
                ));
            }
            Ok(())
        }
        TriggerCondition::SeverityGte { .. } | TriggerCondition::SeverityLte { .. } => Ok(()),
        TriggerCondition::All { conditions } | TriggerCondition::Any { conditions } => {
            if conditions.is_empty() {
                return Err(AegisError::InvalidTriggerCondition(
                    "composite condition must have at least one child".to_string(),
                ));
            }
            for child in conditions {
                validate_nodes(child)?;
            }
            Ok(())
        }
        TriggerCondition::Not { condition } => validate_nodes(condition),
    }
}

fn evaluate_at(alert: &Alert, condition: &TriggerCondition, depth: usize) -> bool {
    if depth > MAX_CONDITION_DEPTH {
        return false;
    }
    match condition {
        TriggerCondition::Equals { field, value } => {
            field_value(alert, field).map(|v| &v == value).unwrap_or(false)
        }
        TriggerCondition::InSet { field, values } => field_value(alert, field)
            .map(|v| values.contains(&v))
            .unwrap_or(false),
        TriggerCondition::SeverityGte { severity } => alert.severity >= *severity,
        TriggerCondition::SeverityLte { severity } => alert.severity <= *severity,
        TriggerCondition::All { conditions } => conditions
            .iter()
            .all(|c| evaluate_at(alert, c, depth + 1)),
        TriggerCondition::Any { conditions } => conditions
            .iter()
            .any(|c| evaluate_at(alert, c, depth + 1)),
        TriggerCondition::Not { condition } => !evaluate_at(alert, condition, depth + 1),
    }
}

/// Resolve a predicate field name against the alert. Built-in fields first,
/// then the free-form attribute map.
fn field_value(alert: &Alert, field: &str) -> Option<Value> {
    match field {
        "severity" => Some(Value::String(alert.severity.to_string())),
        "status" => Some(Value::String(alert.status.to_string())),
        "source" => Some(Value::String(alert.source.clone())),
        "title" => Some(Value::String(alert.title.clone())),
        other => alert.attributes.get(other).cloned(),
    }
}
