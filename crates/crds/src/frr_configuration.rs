//! FRRConfiguration CRD
//!
//! Desired routing-daemon configuration consumed by the per-node FRR agent.
//! The speaker owns one object per node and only ever writes its `spec`.

use crate::common::{LabelSelector, SecretReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "frrk8s.metallb.io",
    version = "v1beta1",
    kind = "FRRConfiguration",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FRRConfigurationSpec {
    #[serde(default)]
    pub bgp: BgpConfig,

    /// Nodes the configuration applies to
    #[serde(default)]
    pub node_selector: LabelSelector,
}

/// Routers and BFD profiles.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BgpConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routers: Vec<Router>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bfd_profiles: Vec<BfdProfile>,
}

/// One BGP router instance, identified by ASN and VRF.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    pub asn: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<Neighbor>,

    /// Every prefix any neighbor of the router may advertise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
}

/// A BGP neighbor of a router.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    #[serde(default)]
    pub asn: u32,

    #[serde(default, rename = "dynamicASN", skip_serializing_if = "Option::is_none")]
    pub dynamic_asn: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_time: Option<String>,

    #[serde(default)]
    pub ebgp_multi_hop: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bfd_profile: Option<String>,

    #[serde(default)]
    pub enable_graceful_restart: bool,

    #[serde(default, rename = "disableMP")]
    pub disable_mp: bool,

    #[serde(default)]
    pub dual_stack_address_family: bool,

    #[serde(default)]
    pub to_advertise: Advertise,
}

/// What a neighbor is allowed to advertise, and with which attributes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Advertise {
    #[serde(default)]
    pub allowed: AllowedPrefixes,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub with_local_pref: Vec<LocalPrefPrefixes>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub with_community: Vec<CommunityPrefixes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct AllowedPrefixes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalPrefPrefixes {
    pub prefixes: Vec<String>,
    pub local_pref: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct CommunityPrefixes {
    pub prefixes: Vec<String>,
    pub community: String,
}

/// BFD profile as understood by the FRR agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BfdProfile {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_interval: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmit_interval: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_multiplier: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_interval: Option<u32>,

    #[serde(default)]
    pub echo_mode: bool,

    #[serde(default)]
    pub passive_mode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_ttl: Option<u32>,
}
