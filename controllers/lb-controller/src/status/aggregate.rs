//! Derives the aggregate `Ready` condition from the component conditions.

use super::conditions::{CONDITION_TYPE_READY, remove_condition};
use crds::{CONDITION_FALSE, CONDITION_TRUE, CONDITION_UNKNOWN, Condition, ConfigurationResult};

const REASON_WAITING: &str = "WaitingForConditions";
const REASON_ALL_READY: &str = "AllComponentsReady";
const REASON_FAILING: &str = "ComponentFailing";
const REASON_MANY_FAILING: &str = "ComponentsFailing";

/// Aggregate verdict over every component condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// The `Ready` condition, without a transition time
    pub ready: Condition,
    pub result: ConfigurationResult,
    /// Messages of the failing components joined by `; `
    pub error_summary: String,
}

/// Computes the aggregate. Any `Ready` entry in `conditions` is ignored.
pub fn compute_ready(conditions: &[Condition]) -> Aggregate {
    let mut components = conditions.to_vec();
    remove_condition(&mut components, CONDITION_TYPE_READY);

    if components.is_empty() {
        return Aggregate {
            ready: Condition::new(
                CONDITION_TYPE_READY,
                CONDITION_UNKNOWN,
                REASON_WAITING,
                "No controller conditions reported yet",
            ),
            result: ConfigurationResult::Unknown,
            error_summary: String::new(),
        };
    }

    let failing: Vec<&Condition> = components.iter().filter(|c| c.is_false()).collect();
    if failing.is_empty() {
        return Aggregate {
            ready: Condition::new(CONDITION_TYPE_READY, CONDITION_TRUE, REASON_ALL_READY, ""),
            result: ConfigurationResult::Valid,
            error_summary: String::new(),
        };
    }

    let reason = if failing.len() == 1 {
        REASON_FAILING
    } else {
        REASON_MANY_FAILING
    };
    let names: Vec<&str> = failing.iter().map(|c| c.type_.as_str()).collect();
    let summary: Vec<&str> = failing
        .iter()
        .map(|c| c.message.as_str())
        .filter(|m| !m.is_empty())
        .collect();

    Aggregate {
        ready: Condition::new(
            CONDITION_TYPE_READY,
            CONDITION_FALSE,
            reason,
            format!("Failed components: [{}]", names.join(" ")),
        ),
        result: ConfigurationResult::Invalid,
        error_summary: summary.join("; "),
    }
}
