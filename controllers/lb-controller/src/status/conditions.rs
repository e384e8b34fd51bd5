//! Condition management helpers following Kubernetes API conventions

use chrono::Utc;
use crds::Condition;

/// Type of the aggregate condition.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Current time in the RFC 3339 form conditions carry.
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Update or add a condition, returning whether anything visible changed.
///
/// The transition time is set to `now` when the condition is new or its
/// status flips; otherwise the existing time is kept.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition, now: &str) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            let status_changed = existing.status != condition.status;
            let changed = status_changed
                || existing.reason != condition.reason
                || existing.message != condition.message;

            existing.status = condition.status;
            existing.reason = condition.reason;
            existing.message = condition.message;
            if status_changed || existing.last_transition_time.is_none() {
                existing.last_transition_time = Some(now.to_string());
            }
            changed
        }
        None => {
            conditions.push(Condition {
                last_transition_time: Some(now.to_string()),
                ..condition
            });
            true
        }
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Remove a condition by type
pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}
