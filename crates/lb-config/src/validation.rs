//! Backend validation policies.
//!
//! The native BGP backend and the FRR backends each accept a different
//! subset of peer and advertisement features. The policy for the active
//! backend runs before the structural checks of [`crate::build_config`].

use crate::cidr::{IpFamily, parse_cidr};
use crate::community::BgpCommunity;
use crate::config::{Config, selected_pools};
use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::resources::ClusterResources;
use crate::selector::selectors_can_overlap;
use crds::{BGPPeer, BGPPeerSpec};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// Which resource features to reject before building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Reject features only the FRR backends support (native mode)
    DiscardFrrOnly,
    /// Reject configurations the FRR backends cannot express
    DiscardNativeOnly,
    /// Structural checks only
    #[default]
    DontValidate,
}

impl Validation {
    /// Policy for a `BGP_TYPE` value.
    pub fn for_bgp_type(bgp_type: &str) -> Self {
        match bgp_type {
            "frr" | "frr-k8s" => Self::DiscardNativeOnly,
            "native" => Self::DiscardFrrOnly,
            _ => Self::DontValidate,
        }
    }

    /// Runs the policy against a resource set.
    pub fn check(&self, resources: &ClusterResources) -> Result<(), ConfigError> {
        match self {
            Self::DiscardFrrOnly => discard_frr_only(resources),
            Self::DiscardNativeOnly => discard_native_only(resources),
            Self::DontValidate => Ok(()),
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DiscardFrrOnly => "discard-frr-only",
            Self::DiscardNativeOnly => "discard-native-only",
            Self::DontValidate => "dont-validate",
        };
        f.write_str(s)
    }
}

fn unsupported(msg: String) -> ConfigError {
    ConfigError::Unsupported(msg)
}

/// An explicit zero means "unset". Malformed values are left to the builder,
/// which reports them against the field.
fn nonzero_duration(raw: &str) -> bool {
    parse_duration(raw).is_ok_and(|d| !d.is_zero())
}

fn discard_frr_only(resources: &ClusterResources) -> Result<(), ConfigError> {
    for peer in &resources.peers {
        let name = peer.name_any();
        let spec = &peer.spec;
        let flags: [(bool, &str); 9] = [
            (spec.bfd_profile.as_deref().is_some_and(|p| !p.is_empty()), "bfd-profile set"),
            (spec.keepalive_time.as_deref().is_some_and(nonzero_duration), "keepalive-time set"),
            (spec.vrf.as_deref().is_some_and(|v| !v.is_empty()), "vrf set"),
            (spec.connect_time.is_some(), "connect time set"),
            (spec.enable_graceful_restart, "EnableGracefulRestart flag set"),
            (spec.disable_mp, "disable MP flag set"),
            (spec.dual_stack_address_family, "dualstackaddressfamily flag set"),
            (spec.dynamic_asn.is_some(), "dynamicASN set"),
            (spec.interface.as_deref().is_some_and(|i| !i.is_empty()), "interface set"),
        ];
        if let Some((_, what)) = flags.iter().find(|(set, _)| *set) {
            return Err(unsupported(format!("peer {name} has {what} on native bgp mode")));
        }
    }

    if !resources.bfd_profiles.is_empty() {
        return Err(unsupported("bfd profiles section set".to_string()));
    }

    for adv in &resources.bgp_advertisements {
        let adv_name = adv.name_any();
        // Unknown pools are reported by the builder with a better message.
        let selected = selected_pools(
            &adv.spec.ip_address_pools,
            &adv.spec.ip_address_pool_selectors,
            &resources.pools,
        )
        .unwrap_or_default();
        for pool in resources.pools.iter().filter(|p| selected.contains(&p.name_any())) {
            for addr in &pool.spec.addresses {
                let Ok(nets) = parse_cidr(addr) else { continue };
                if nets.iter().any(|n| IpFamily::of(n) == IpFamily::V6) {
                    return Err(unsupported(format!(
                        "pool {:?} has ipv6 CIDR {addr}, native bgp mode does not support ipv6",
                        pool.name_any()
                    )));
                }
            }
        }
        for raw in &adv.spec.communities {
            if let Ok(c) = raw.parse::<BgpCommunity>() {
                if !c.is_legacy() {
                    return Err(unsupported(format!(
                        "native BGP mode only supports legacy communities, BGP advertisement {adv_name:?} has non legacy community {raw:?}"
                    )));
                }
            }
        }
    }

    for legacy in resources.legacy_pools.iter().filter(|p| p.spec.protocol == "bgp") {
        for addr in &legacy.spec.addresses {
            let Ok(nets) = parse_cidr(addr) else { continue };
            if nets.iter().any(|n| IpFamily::of(n) == IpFamily::V6) {
                return Err(unsupported(format!(
                    "pool {:?} has ipv6 CIDR {addr}, native bgp mode does not support ipv6",
                    legacy.name_any()
                )));
            }
        }
    }

    for cr in &resources.communities {
        for alias in &cr.spec.communities {
            if let Ok(c) = alias.value.parse::<BgpCommunity>() {
                if !c.is_legacy() {
                    return Err(unsupported(format!(
                        "native BGP mode only supports legacy communities, Community {:?} has non legacy community {:?}",
                        cr.name_any(),
                        alias.name
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Identity of a session endpoint: address (or interface) within a VRF.
fn session_key(spec: &BGPPeerSpec) -> (String, String) {
    let endpoint = if spec.peer_address.is_empty() {
        spec.interface.clone().unwrap_or_default()
    } else {
        spec.peer_address.clone()
    };
    (endpoint, spec.vrf.clone().unwrap_or_default())
}

fn discard_native_only(resources: &ClusterResources) -> Result<(), ConfigError> {
    let Some(first) = resources.peers.first() else {
        return Ok(());
    };

    let router_id = first.spec.router_id.clone().unwrap_or_default();
    for peer in &resources.peers[1..] {
        if peer.spec.router_id.clone().unwrap_or_default() != router_id {
            return Err(unsupported(format!(
                "peer {} has RouterID different from {}, in FRR mode all RouterID must be equal",
                peer.name_any(),
                first.name_any()
            )));
        }
    }

    let mut by_vrf: BTreeMap<String, &BGPPeer> = BTreeMap::new();
    for peer in &resources.peers {
        let vrf = peer.spec.vrf.clone().unwrap_or_default();
        match by_vrf.get(&vrf) {
            Some(other) if other.spec.my_asn != peer.spec.my_asn => {
                return Err(unsupported(format!(
                    "peer {} has myAsn different from {}, in FRR mode all myAsn must be equal for the same VRF",
                    peer.name_any(),
                    other.name_any()
                )));
            }
            Some(_) => {}
            None => {
                by_vrf.insert(vrf, peer);
            }
        }
    }

    let mut by_session: BTreeMap<(String, String), Vec<&BGPPeer>> = BTreeMap::new();
    for peer in &resources.peers {
        by_session.entry(session_key(&peer.spec)).or_default().push(peer);
    }
    for ((endpoint, _), group) in by_session.iter().filter(|(_, g)| g.len() > 1) {
        if let Some(bare) = group.iter().find(|p| p.spec.node_selectors.is_empty()) {
            return Err(unsupported(format!(
                "duplicate peer {} has no nodeSelectors, in FRR mode each duplicate peer must have nodeSelectors to differentiate",
                bare.name_any()
            )));
        }
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if !selectors_can_overlap(&a.spec.node_selectors, &b.spec.node_selectors) {
                    continue;
                }
                let without_selectors = |spec: &BGPPeerSpec| BGPPeerSpec {
                    node_selectors: Vec::new(),
                    ..spec.clone()
                };
                if without_selectors(&a.spec) != without_selectors(&b.spec) {
                    return Err(unsupported(format!(
                        "duplicate peers with address/interface {endpoint} might select the same nodes but have incompatible configurations (different ASN, ports, timers, BFD profiles, etc.)"
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Whole-config consistency checks that need resolved references.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    for pool in config.pools.by_name.values() {
        if !pool.has_family(IpFamily::V6) {
            continue;
        }
        for adv in &pool.bgp_advertisements {
            for peer in config.peers.values().filter(|p| adv.targets_peer(&p.name)) {
                let echo = peer
                    .bfd_profile
                    .as_ref()
                    .and_then(|name| config.bfd_profiles.get(name))
                    .is_some_and(|profile| profile.echo_mode);
                if echo {
                    return Err(unsupported(format!(
                        "pool {} has bgpadvertisement {} which references peer {} which has bfd echo enabled, which is not possible",
                        pool.name, adv.name, peer.name
                    )));
                }
            }
        }
    }
    Ok(())
}
