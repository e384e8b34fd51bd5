//! AddressPool CRD (legacy form)
//!
//! Older single-object pool definition carrying its own protocol and BGP
//! advertisement settings. Still accepted and merged with `IPAddressPool`s.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "metallb.io",
    version = "v1beta1",
    kind = "AddressPool",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddressPoolSpec {
    /// `bgp` or `layer2`
    #[serde(default)]
    pub protocol: String,

    pub addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_assign: Option<bool>,

    #[serde(default, rename = "avoidBuggyIPs")]
    pub avoid_buggy_ips: bool,

    /// Only valid for `bgp` pools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bgp_advertisements: Vec<LegacyBgpAdvertisement>,
}

/// Advertisement settings embedded in a legacy pool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBgpAdvertisement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_length: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_length_v6: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_pref: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<String>,
}
