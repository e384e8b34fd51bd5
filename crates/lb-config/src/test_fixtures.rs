//! Resource builders for tests.

use crds::{
    AddressPool, AddressPoolSpec, BFDProfile, BFDProfileSpec, BGPAdvertisement,
    BGPAdvertisementSpec, BGPPeer, BGPPeerSpec, Community, CommunityAlias, CommunitySpec,
    IPAddressPool, IPAddressPoolSpec, L2Advertisement, L2AdvertisementSpec,
};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Namespace, Node, Secret};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

/// Namespace used by every namespaced fixture.
pub const TEST_NAMESPACE: &str = "metallb-system";

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(TEST_NAMESPACE.to_string()),
        generation: Some(1),
        ..Default::default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

pub fn pool(name: &str, addresses: &[&str]) -> IPAddressPool {
    IPAddressPool {
        metadata: meta(name),
        spec: IPAddressPoolSpec {
            addresses: strings(addresses),
            ..Default::default()
        },
        status: None,
    }
}

pub fn legacy_pool(name: &str, protocol: &str, addresses: &[&str]) -> AddressPool {
    AddressPool {
        metadata: meta(name),
        spec: AddressPoolSpec {
            protocol: protocol.to_string(),
            addresses: strings(addresses),
            ..Default::default()
        },
    }
}

pub fn peer(name: &str, my_asn: u32, peer_asn: u32, address: &str) -> BGPPeer {
    BGPPeer {
        metadata: meta(name),
        spec: BGPPeerSpec {
            my_asn,
            peer_asn,
            peer_address: address.to_string(),
            ..Default::default()
        },
    }
}

pub fn bfd_profile(name: &str) -> BFDProfile {
    BFDProfile {
        metadata: meta(name),
        spec: BFDProfileSpec::default(),
    }
}

pub fn bgp_adv(name: &str, pools: &[&str]) -> BGPAdvertisement {
    BGPAdvertisement {
        metadata: meta(name),
        spec: BGPAdvertisementSpec {
            ip_address_pools: strings(pools),
            ..Default::default()
        },
    }
}

pub fn l2_adv(name: &str, pools: &[&str]) -> L2Advertisement {
    L2Advertisement {
        metadata: meta(name),
        spec: L2AdvertisementSpec {
            ip_address_pools: strings(pools),
            ..Default::default()
        },
    }
}

pub fn community(name: &str, aliases: &[(&str, &str)]) -> Community {
    Community {
        metadata: meta(name),
        spec: CommunitySpec {
            communities: aliases
                .iter()
                .map(|(n, v)| CommunityAlias {
                    name: (*n).to_string(),
                    value: (*v).to_string(),
                })
                .collect(),
        },
    }
}

/// A basic-auth secret carrying `password`.
pub fn secret(name: &str, password: &str) -> Secret {
    Secret {
        metadata: meta(name),
        type_: Some("kubernetes.io/basic-auth".to_string()),
        data: Some(BTreeMap::from([(
            "password".to_string(),
            ByteString(password.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

pub fn node(name: &str, node_labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(node_labels)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn namespace(name: &str, ns_labels: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels(ns_labels)),
            ..Default::default()
        },
        ..Default::default()
    }
}
