//! BGPPeer CRD
//!
//! A remote router the speakers establish BGP sessions with.

use crate::common::{LabelSelector, SecretReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "metallb.io",
    version = "v1beta2",
    kind = "BGPPeer",
    namespaced,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".spec.peerAddress"}"#,
    printcolumn = r#"{"name":"ASN","type":"string","jsonPath":".spec.peerASN"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BGPPeerSpec {
    /// Local AS number
    #[serde(default, rename = "myASN")]
    pub my_asn: u32,

    /// Remote AS number (exclusive with `dynamicASN`)
    #[serde(default, rename = "peerASN")]
    pub peer_asn: u32,

    /// Let the session detect the remote AS
    #[serde(default, rename = "dynamicASN", skip_serializing_if = "Option::is_none")]
    pub dynamic_asn: Option<DynamicAsnMode>,

    /// Remote address; may be empty when `interface` is set
    #[serde(default)]
    pub peer_address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,

    /// Unnumbered BGP interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Defaults to 179
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<u16>,

    /// Duration string, `0` or at least `3s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_time: Option<String>,

    #[serde(default, rename = "routerID", skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,

    /// Nodes that should peer; empty means all nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_selectors: Vec<LabelSelector>,

    /// Plain-text session password (exclusive with `passwordSecret`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// `kubernetes.io/basic-auth` secret holding the session password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bfd_profile: Option<String>,

    #[serde(default)]
    pub ebgp_multi_hop: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,

    #[serde(default)]
    pub enable_graceful_restart: bool,

    #[serde(default, rename = "disableMP")]
    pub disable_mp: bool,

    #[serde(default)]
    pub dual_stack_address_family: bool,
}

/// Dynamic remote AS detection mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DynamicAsnMode {
    /// Remote AS equals the local AS
    Internal,
    /// Remote AS differs from the local AS
    External,
}
