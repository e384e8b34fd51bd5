//! Raw cluster state fed into the config builder.

use crate::redact::REDACTED;
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, IPAddressPool,
    L2Advertisement,
};
use k8s_openapi::api::core::v1::{Namespace, Node, Secret};
use kube::ResourceExt;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

/// Every resource the builder reads, as listed from the API.
///
/// Collections arrive in arbitrary order; call [`ClusterResources::canonicalize`]
/// before building so the result does not depend on listing order.
#[derive(Clone, Default)]
pub struct ClusterResources {
    pub pools: Vec<IPAddressPool>,
    pub legacy_pools: Vec<AddressPool>,
    pub peers: Vec<BGPPeer>,
    pub bfd_profiles: Vec<BFDProfile>,
    pub bgp_advertisements: Vec<BGPAdvertisement>,
    pub l2_advertisements: Vec<L2Advertisement>,
    pub communities: Vec<Community>,
    /// Peer password secrets keyed by secret name
    pub password_secrets: BTreeMap<String, Secret>,
    pub nodes: Vec<Node>,
    pub namespaces: Vec<Namespace>,
    /// Free-form per-peer BGP options keyed by peer name
    pub bgp_extras: BTreeMap<String, String>,
}

fn sort_by_name<K: ResourceExt>(items: &mut [K]) {
    items.sort_by_cached_key(ResourceExt::name_any);
}

impl ClusterResources {
    /// Sorts every collection by object name. Maps are left untouched.
    #[must_use]
    pub fn canonicalize(mut self) -> Self {
        sort_by_name(&mut self.pools);
        sort_by_name(&mut self.legacy_pools);
        sort_by_name(&mut self.peers);
        sort_by_name(&mut self.bfd_profiles);
        sort_by_name(&mut self.bgp_advertisements);
        sort_by_name(&mut self.l2_advertisements);
        sort_by_name(&mut self.communities);
        sort_by_name(&mut self.nodes);
        sort_by_name(&mut self.namespaces);
        self
    }

    /// Diagnostic JSON dump with every password replaced.
    pub fn dump(&self) -> String {
        let peers: Vec<Value> = self
            .peers
            .iter()
            .map(|peer| {
                let mut value = serde_json::to_value(peer).unwrap_or(Value::Null);
                if let Some(password) = value.pointer_mut("/spec/password") {
                    *password = Value::String(REDACTED.to_string());
                }
                value
            })
            .collect();

        let secrets: BTreeMap<&String, Value> = self
            .password_secrets
            .iter()
            .map(|(name, secret)| {
                let keys: BTreeMap<&String, &str> = secret
                    .data
                    .iter()
                    .flat_map(BTreeMap::keys)
                    .chain(secret.string_data.iter().flat_map(BTreeMap::keys))
                    .map(|k| (k, REDACTED))
                    .collect();
                (name, json!({ "type": secret.type_, "data": keys }))
            })
            .collect();

        let names = |items: Vec<String>| Value::from(items);
        let dump = json!({
            "pools": serde_json::to_value(&self.pools).unwrap_or(Value::Null),
            "legacyPools": serde_json::to_value(&self.legacy_pools).unwrap_or(Value::Null),
            "peers": peers,
            "bfdProfiles": serde_json::to_value(&self.bfd_profiles).unwrap_or(Value::Null),
            "bgpAdvertisements": serde_json::to_value(&self.bgp_advertisements).unwrap_or(Value::Null),
            "l2Advertisements": serde_json::to_value(&self.l2_advertisements).unwrap_or(Value::Null),
            "communities": serde_json::to_value(&self.communities).unwrap_or(Value::Null),
            "passwordSecrets": secrets,
            "nodes": names(self.nodes.iter().map(ResourceExt::name_any).collect()),
            "namespaces": names(self.namespaces.iter().map(ResourceExt::name_any).collect()),
            "bgpExtras": self.bgp_extras,
        });
        serde_json::to_string_pretty(&dump).unwrap_or_default()
    }
}

impl fmt::Debug for ClusterResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{peer, pool, secret};

    #[test]
    fn test_canonicalize_sorts_by_name() {
        let resources = ClusterResources {
            pools: vec![pool("c", &["10.0.3.0/24"]), pool("a", &["10.0.1.0/24"]), pool("b", &["10.0.2.0/24"])],
            ..Default::default()
        }
        .canonicalize();
        let names: Vec<String> = resources.pools.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dump_redacts_passwords() {
        let mut with_password = peer("p1", 64512, 64513, "10.0.0.1");
        with_password.spec.password = Some("s3cr3t-inline".to_string());
        let resources = ClusterResources {
            peers: vec![with_password],
            password_secrets: BTreeMap::from([("bgp-auth".to_string(), secret("bgp-auth", "s3cr3t-secret"))]),
            ..Default::default()
        };
        let dump = format!("{resources:?}");
        assert!(!dump.contains("s3cr3t-inline"));
        assert!(!dump.contains("s3cr3t-secret"));
        assert!(dump.contains(REDACTED));
    }
}
