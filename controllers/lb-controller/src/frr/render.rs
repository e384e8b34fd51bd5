//! Renders the desired `FRRConfiguration` spec for one node.

use crds::{
    Advertise, AllowedPrefixes, BfdProfile as FrrBfdProfile, BgpConfig, CommunityPrefixes,
    DynamicAsnMode, FRRConfigurationSpec, LabelSelector, LocalPrefPrefixes, Neighbor, Router,
};
use ipnet::IpNet;
use lb_config::{BfdProfile, Config, IpFamily, Peer, format_duration};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Label carrying the node name, used as the rendered node selector.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Prefixes one neighbor may announce, with their attributes.
#[derive(Default)]
struct Announcements {
    allowed: BTreeSet<String>,
    local_pref: BTreeMap<u32, BTreeSet<String>>,
    communities: BTreeMap<String, BTreeSet<String>>,
}

impl Announcements {
    fn into_advertise(self) -> Advertise {
        Advertise {
            allowed: AllowedPrefixes {
                prefixes: self.allowed.into_iter().collect(),
            },
            with_local_pref: self
                .local_pref
                .into_iter()
                .map(|(local_pref, prefixes)| LocalPrefPrefixes {
                    prefixes: prefixes.into_iter().collect(),
                    local_pref,
                })
                .collect(),
            with_community: self
                .communities
                .into_iter()
                .map(|(community, prefixes)| CommunityPrefixes {
                    prefixes: prefixes.into_iter().collect(),
                    community,
                })
                .collect(),
        }
    }
}

/// The `FRRConfiguration` spec `node` should run, or `None` when no peer selects the node.
///
/// Only service IPs whose pool carries a BGP advertisement for this node
/// are announced; each is aggregated to the advertisement's length for
/// its family.
pub fn desired_spec(
    node: &str,
    node_labels: &BTreeMap<String, String>,
    config: &Config,
    service_ips: &BTreeSet<IpAddr>,
) -> Option<FRRConfigurationSpec> {
    let peers: Vec<&Peer> = config
        .peers
        .values()
        .filter(|p| p.selects_node(node_labels))
        .collect();
    if peers.is_empty() {
        return None;
    }

    let mut routers: BTreeMap<(u32, String, Option<String>), Router> = BTreeMap::new();
    for peer in &peers {
        let announcements = announcements_for(node, peer, config, service_ips);
        let router_id = peer.router_id.map(|id| id.to_string());
        let router = routers
            .entry((peer.my_asn, peer.vrf.clone(), router_id.clone()))
            .or_insert_with(|| Router {
                asn: peer.my_asn,
                id: router_id,
                vrf: (!peer.vrf.is_empty()).then(|| peer.vrf.clone()),
                ..Default::default()
            });
        router.prefixes.extend(announcements.allowed.iter().cloned());
        router.neighbors.push(neighbor_for(peer, announcements.into_advertise()));
    }

    let routers = routers
        .into_values()
        .map(|mut router| {
            router.prefixes.sort();
            router.prefixes.dedup();
            router
        })
        .collect();

    let profile_names: BTreeSet<&str> = peers.iter().filter_map(|p| p.bfd_profile.as_deref()).collect();
    let bfd_profiles = profile_names
        .into_iter()
        .filter_map(|name| config.bfd_profiles.get(name))
        .map(bfd_profile_for)
        .collect();

    Some(FRRConfigurationSpec {
        bgp: BgpConfig { routers, bfd_profiles },
        node_selector: LabelSelector::with_label(HOSTNAME_LABEL, node),
    })
}

fn announcements_for(node: &str, peer: &Peer, config: &Config, service_ips: &BTreeSet<IpAddr>) -> Announcements {
    let mut out = Announcements::default();
    let peer_family = peer.addr.as_ref().map(IpFamily::of_addr);

    for ip in service_ips {
        let family = IpFamily::of_addr(ip);
        if !peer.dual_stack_address_family && peer_family.is_some_and(|f| f != family) {
            continue;
        }
        let Some(pool) = config.pools.pool_for(ip) else {
            continue;
        };

        for adv in &pool.bgp_advertisements {
            if !adv.nodes.contains(node) || !adv.targets_peer(&peer.name) {
                continue;
            }
            let length = match family {
                IpFamily::V4 => adv.aggregation_length,
                IpFamily::V6 => adv.aggregation_length_v6,
            };
            let Ok(prefix) = IpNet::new(*ip, length).map(|net| net.trunc()) else {
                continue;
            };
            let prefix = prefix.to_string();

            out.allowed.insert(prefix.clone());
            if adv.local_pref != 0 {
                out.local_pref
                    .entry(adv.local_pref)
                    .or_default()
                    .insert(prefix.clone());
            }
            for community in &adv.communities {
                out.communities
                    .entry(community.to_string())
                    .or_default()
                    .insert(prefix.clone());
            }
        }
    }
    out
}

fn neighbor_for(peer: &Peer, to_advertise: Advertise) -> Neighbor {
    let (asn, dynamic_asn) = match peer.dynamic_asn {
        Some(DynamicAsnMode::Internal) => (0, Some("internal".to_string())),
        Some(DynamicAsnMode::External) => (0, Some("external".to_string())),
        None => (peer.asn, None),
    };

    Neighbor {
        asn,
        dynamic_asn,
        address: peer.addr.map(|a| a.to_string()).unwrap_or_default(),
        interface: peer.iface.clone(),
        port: Some(peer.port),
        source_address: peer.src_addr.map(|a| a.to_string()),
        password_secret: peer.password_secret.clone(),
        hold_time: peer.hold_time.map(format_duration),
        keepalive_time: peer.keepalive_time.map(format_duration),
        connect_time: peer.connect_time.map(format_duration),
        ebgp_multi_hop: peer.ebgp_multihop,
        bfd_profile: peer.bfd_profile.clone(),
        enable_graceful_restart: peer.enable_graceful_restart,
        disable_mp: peer.disable_mp,
        dual_stack_address_family: peer.dual_stack_address_family,
        to_advertise,
    }
}

fn bfd_profile_for(profile: &BfdProfile) -> FrrBfdProfile {
    FrrBfdProfile {
        name: profile.name.clone(),
        receive_interval: profile.receive_interval,
        transmit_interval: profile.transmit_interval,
        detect_multiplier: profile.detect_multiplier,
        echo_interval: profile.echo_interval,
        echo_mode: profile.echo_mode,
        passive_mode: profile.passive_mode,
        minimum_ttl: profile.minimum_ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_config::test_fixtures::{bfd_profile, bgp_adv, community, labels, node, peer, pool};
    use lb_config::{ClusterResources, Validation, build_config};
    use pretty_assertions::assert_eq;

    fn build(resources: ClusterResources) -> Config {
        build_config(&resources.canonicalize(), Validation::DontValidate).expect("valid config")
    }

    fn ips(items: &[&str]) -> BTreeSet<IpAddr> {
        items.iter().map(|s| s.parse().expect("ip")).collect()
    }

    fn node1_labels() -> BTreeMap<String, String> {
        labels(&[(HOSTNAME_LABEL, "node1"), ("rack", "a")])
    }

    fn base() -> ClusterResources {
        ClusterResources {
            pools: vec![pool("pool-a", &["10.0.0.0/24", "2001:db8::/120"])],
            peers: vec![peer("p1", 64512, 64513, "10.1.0.1")],
            bgp_advertisements: vec![bgp_adv("adv-a", &["pool-a"])],
            nodes: vec![node("node1", &[(HOSTNAME_LABEL, "node1"), ("rack", "a")])],
            ..Default::default()
        }
    }

    #[test]
    fn test_no_selected_peer_renders_nothing() {
        let mut resources = base();
        resources.peers[0].spec.node_selectors = vec![LabelSelector::with_label("rack", "b")];
        let config = build(resources);
        assert_eq!(desired_spec("node1", &node1_labels(), &config, &ips(&["10.0.0.5"])), None);
    }

    #[test]
    fn test_service_ip_is_announced_to_matching_family() {
        let config = build(base());
        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&["10.0.0.5", "2001:db8::5"]))
            .expect("peer selected");

        assert_eq!(spec.node_selector, LabelSelector::with_label(HOSTNAME_LABEL, "node1"));
        assert_eq!(spec.bgp.routers.len(), 1);
        let router = &spec.bgp.routers[0];
        assert_eq!(router.asn, 64512);
        assert_eq!(router.vrf, None);
        assert_eq!(router.prefixes, vec!["10.0.0.5/32".to_string()]);

        let neighbor = &router.neighbors[0];
        assert_eq!(neighbor.asn, 64513);
        assert_eq!(neighbor.address, "10.1.0.1");
        assert_eq!(neighbor.port, Some(179));
        assert_eq!(neighbor.to_advertise.allowed.prefixes, vec!["10.0.0.5/32".to_string()]);
    }

    #[test]
    fn test_dual_stack_peer_receives_both_families() {
        let mut resources = base();
        resources.peers[0].spec.dual_stack_address_family = true;
        let config = build(resources);
        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&["10.0.0.5", "2001:db8::5"]))
            .expect("peer selected");
        assert_eq!(
            spec.bgp.routers[0].neighbors[0].to_advertise.allowed.prefixes,
            vec!["10.0.0.5/32".to_string(), "2001:db8::5/128".to_string()]
        );
    }

    #[test]
    fn test_aggregation_local_pref_and_communities() {
        let mut resources = base();
        let adv = &mut resources.bgp_advertisements[0];
        adv.spec.aggregation_length = Some(24);
        adv.spec.local_pref = Some(150);
        adv.spec.communities = vec!["65000:100".to_string(), "edge".to_string()];
        resources.communities = vec![community("aliases", &[("edge", "large:1:2:3")])];
        let config = build(resources);

        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&["10.0.0.5", "10.0.0.9"]))
            .expect("peer selected");
        let advertise = &spec.bgp.routers[0].neighbors[0].to_advertise;
        assert_eq!(advertise.allowed.prefixes, vec!["10.0.0.0/24".to_string()]);
        assert_eq!(
            advertise.with_local_pref,
            vec![LocalPrefPrefixes {
                prefixes: vec!["10.0.0.0/24".to_string()],
                local_pref: 150,
            }]
        );
        let communities: Vec<&str> = advertise.with_community.iter().map(|c| c.community.as_str()).collect();
        assert_eq!(communities, vec!["65000:100", "large:1:2:3"]);
    }

    #[test]
    fn test_advertisement_limited_to_other_nodes_is_not_announced() {
        let mut resources = base();
        resources.nodes.push(node("node2", &[(HOSTNAME_LABEL, "node2"), ("rack", "b")]));
        resources.bgp_advertisements[0].spec.node_selectors = vec![LabelSelector::with_label("rack", "b")];
        let config = build(resources);

        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&["10.0.0.5"])).expect("peer selected");
        assert!(spec.bgp.routers[0].prefixes.is_empty());
        assert!(spec.bgp.routers[0].neighbors[0].to_advertise.allowed.prefixes.is_empty());
    }

    #[test]
    fn test_ip_outside_every_pool_is_ignored() {
        let config = build(base());
        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&["192.168.1.1"])).expect("peer selected");
        assert!(spec.bgp.routers[0].prefixes.is_empty());
    }

    #[test]
    fn test_peers_grouped_by_asn_and_vrf() {
        let mut resources = base();
        let mut second = peer("p2", 64512, 64514, "10.1.0.2");
        second.spec.bfd_profile = Some("fast".to_string());
        let mut in_vrf = peer("p3", 64512, 64515, "10.1.0.3");
        in_vrf.spec.vrf = Some("red".to_string());
        resources.peers.extend([second, in_vrf]);
        resources.bfd_profiles = vec![bfd_profile("fast")];
        let config = build(resources);

        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&[])).expect("peers selected");
        assert_eq!(spec.bgp.routers.len(), 2);
        assert_eq!(spec.bgp.routers[0].vrf, None);
        assert_eq!(spec.bgp.routers[0].neighbors.len(), 2);
        assert_eq!(spec.bgp.routers[1].vrf.as_deref(), Some("red"));
        let profiles: Vec<&str> = spec.bgp.bfd_profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(profiles, vec!["fast"]);
    }

    #[test]
    fn test_dynamic_asn_neighbor() {
        let mut resources = base();
        resources.peers[0].spec.peer_asn = 0;
        resources.peers[0].spec.dynamic_asn = Some(DynamicAsnMode::External);
        let config = build(resources);
        let spec = desired_spec("node1", &node1_labels(), &config, &ips(&[])).expect("peer selected");
        let neighbor = &spec.bgp.routers[0].neighbors[0];
        assert_eq!(neighbor.asn, 0);
        assert_eq!(neighbor.dynamic_asn.as_deref(), Some("external"));
    }
}
