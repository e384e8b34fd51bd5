//! Types shared by several custom resources.
//!
//! Label selectors and conditions are modelled locally instead of reusing the
//! `k8s-openapi` structs so that every field carries a `JsonSchema` and
//! `PartialEq` implementation usable by the config builder.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kubernetes-style label selector.
///
/// An empty selector matches every object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact label matches, ANDed together
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements, ANDed together
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Selector matching a single `key=value` label.
    pub fn with_label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            match_labels: BTreeMap::from([(key.into(), value.into())]),
            match_expressions: Vec::new(),
        }
    }
}

/// One set-based requirement of a [`LabelSelector`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// One of `In`, `NotIn`, `Exists`, `DoesNotExist`
    pub operator: String,

    /// Values for `In` / `NotIn`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Reference to a Secret, optionally in another namespace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,

    /// Secret namespace (defaults to the referencing object's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Condition status value `True`.
pub const CONDITION_TRUE: &str = "True";
/// Condition status value `False`.
pub const CONDITION_FALSE: &str = "False";
/// Condition status value `Unknown`.
pub const CONDITION_UNKNOWN: &str = "Unknown";

/// Kubernetes-style status condition.
///
/// Conditions are keyed by `type`; the CRD schema declares the list as a
/// map list so server-side apply merges entries per type.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within one object
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,

    /// Machine-readable reason in CamelCase
    #[serde(default)]
    pub reason: String,

    /// Human-readable detail
    #[serde(default)]
    pub message: String,

    /// RFC 3339 timestamp of the last status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Generation of the object the condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Builds a condition without timestamps.
    pub fn new(
        type_: impl Into<String>,
        status: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
            observed_generation: None,
        }
    }

    /// Returns true when status is `True`.
    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }

    /// Returns true when status is `False`.
    pub fn is_false(&self) -> bool {
        self.status == CONDITION_FALSE
    }
}
