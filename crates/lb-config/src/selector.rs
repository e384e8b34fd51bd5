//! Label selector evaluation.

use crds::LabelSelector;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors produced while compiling a label selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid label selector operator {0:?}")]
    UnknownOperator(String),

    #[error("label selector operator {0} on key {1:?} requires at least one value")]
    MissingValues(String, String),

    #[error("label selector operator {0} on key {1:?} does not take values")]
    UnexpectedValues(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Requirement {
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// A compiled label selector. All requirements must hold for a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Selector {
    requirements: BTreeSet<Requirement>,
}

impl Selector {
    /// Selector matching every label set.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Compiles an API label selector.
    pub fn compile(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let mut requirements = BTreeSet::new();
        for (key, value) in &selector.match_labels {
            requirements.insert(Requirement::In(key.clone(), BTreeSet::from([value.clone()])));
        }
        for expr in &selector.match_expressions {
            let values: BTreeSet<String> = expr.values.iter().cloned().collect();
            let requirement = match expr.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(SelectorError::MissingValues(expr.operator.clone(), expr.key.clone()));
                }
                "Exists" | "DoesNotExist" if !values.is_empty() => {
                    return Err(SelectorError::UnexpectedValues(expr.operator.clone(), expr.key.clone()));
                }
                "In" => Requirement::In(expr.key.clone(), values),
                "NotIn" => Requirement::NotIn(expr.key.clone(), values),
                "Exists" => Requirement::Exists(expr.key.clone()),
                "DoesNotExist" => Requirement::DoesNotExist(expr.key.clone()),
                other => return Err(SelectorError::UnknownOperator(other.to_string())),
            };
            requirements.insert(requirement);
        }
        Ok(Self { requirements })
    }

    /// Compiles a list of selectors; an empty list yields one match-all selector.
    pub fn compile_all(selectors: &[LabelSelector]) -> Result<Vec<Self>, SelectorError> {
        if selectors.is_empty() {
            return Ok(vec![Self::everything()]);
        }
        selectors.iter().map(Self::compile).collect()
    }

    /// Whether `labels` satisfies every requirement.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Whether this selector matches everything.
    pub fn is_everything(&self) -> bool {
        self.requirements.is_empty()
    }
}

/// Whether any selector of the list matches (OR semantics).
pub fn any_matches(selectors: &[Selector], labels: &BTreeMap<String, String>) -> bool {
    selectors.iter().any(|s| s.matches(labels))
}

/// True when no object could match both selectors.
///
/// Only contradicting `matchLabels` entries are detected; anything else is
/// assumed to possibly overlap.
pub fn obviously_disjoint(a: &LabelSelector, b: &LabelSelector) -> bool {
    a.match_labels
        .iter()
        .any(|(key, value)| b.match_labels.get(key).is_some_and(|other| other != value))
}

/// Whether two selector lists might select a common object.
pub fn selectors_can_overlap(a: &[LabelSelector], b: &[LabelSelector]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter()
        .any(|sa| b.iter().any(|sb| !obviously_disjoint(sa, sb)))
}
