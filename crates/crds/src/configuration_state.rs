//! ConfigurationState CRD
//!
//! Shared status object the controller and every speaker report their
//! reconciliation health into. Only the status subresource is used.

use crate::common::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default name of the shared status object.
pub const DEFAULT_CONFIGURATION_STATE_NAME: &str = "config-status";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "metallb.io",
    version = "v1beta1",
    kind = "ConfigurationState",
    namespaced,
    status = "ConfigurationStateStatus",
    printcolumn = r#"{"name":"Result","type":"string","jsonPath":".status.result"}"#,
    printcolumn = r#"{"name":"Errors","type":"string","jsonPath":".status.errorSummary"}"#
)]
#[allow(clippy::empty_structs_with_brackets, reason = "CRD spec must serialize as an object")]
pub struct ConfigurationStateSpec {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStateStatus {
    /// Per-component conditions plus the aggregate `Ready`
    #[serde(default)]
    #[schemars(extend("x-kubernetes-list-type" = "map", "x-kubernetes-list-map-keys" = ["type"]))]
    pub conditions: Vec<Condition>,

    /// Summary of all component conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ConfigurationResult>,

    /// Messages of the failing components
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
}

/// Overall verdict on the last reported configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConfigurationResult {
    Valid,
    Invalid,
    Unknown,
}
