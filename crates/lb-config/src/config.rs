//! The canonical configuration snapshot and the builder producing it.
//!
//! [`build_config`] is a pure function of its input: given the same set of
//! resources (in canonical order) it returns an identical [`Config`]. All
//! maps are `BTreeMap`s so equality and iteration order are deterministic.

use crate::cidr::{self, AddressRange, IpFamily};
use crate::community::BgpCommunity;
use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::redact::RedactedString;
use crate::resources::ClusterResources;
use crate::selector::{Selector, any_matches};
use crate::validation::{Validation, validate_config};
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, DynamicAsnMode,
    IPAddressPool, L2Advertisement as L2AdvertisementCr, LabelSelector, SecretReference,
};
use ipnet::IpNet;
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Default BGP port.
pub const DEFAULT_BGP_PORT: u16 = 179;

const SECRET_TYPE_BASIC_AUTH: &str = "kubernetes.io/basic-auth";
const SECRET_PASSWORD_KEY: &str = "password";

/// Validated configuration handed to the announcement handlers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub pools: Pools,
    pub peers: BTreeMap<String, Peer>,
    pub bfd_profiles: BTreeMap<String, BfdProfile>,
}

impl Config {
    /// Diagnostic dump; passwords are redacted by their type.
    pub fn dump(&self) -> String {
        format!("{self:#?}")
    }
}

/// Pools keyed by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pools {
    pub by_name: BTreeMap<String, Pool>,
}

impl Pools {
    pub fn get(&self, name: &str) -> Option<&Pool> {
        self.by_name.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// The pool whose ranges contain `ip`, if any. Pools never overlap so
    /// at most one matches.
    pub fn pool_for(&self, ip: &IpAddr) -> Option<&Pool> {
        self.by_name.values().find(|p| p.contains(ip))
    }
}

/// An address pool with its parsed ranges and the advertisements bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub name: String,
    pub ranges: Vec<AddressRange>,
    pub auto_assign: bool,
    pub avoid_buggy_ips: bool,
    pub service_allocation: Option<ServiceAllocation>,
    pub bgp_advertisements: Vec<BgpAdvertisement>,
    pub l2_advertisements: Vec<L2Advertisement>,
}

impl Pool {
    /// Every prefix of the pool, in definition order.
    pub fn cidrs(&self) -> impl Iterator<Item = &IpNet> {
        self.ranges.iter().flat_map(|r| r.cidrs.iter())
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.cidrs().any(|net| net.contains(ip))
    }

    /// Number of addresses of the given family, saturating.
    pub fn size(&self, family: IpFamily) -> u64 {
        self.cidrs()
            .filter(|net| IpFamily::of(net) == family)
            .fold(0u64, |acc, net| acc.saturating_add(cidr::size_of(net)))
    }

    pub fn has_family(&self, family: IpFamily) -> bool {
        self.cidrs().any(|net| IpFamily::of(net) == family)
    }
}

/// Service-side restrictions of a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAllocation {
    pub priority: i32,
    pub namespaces: BTreeSet<String>,
    pub namespace_selectors: Vec<Selector>,
    pub service_selectors: Vec<Selector>,
}

/// A BGP advertisement bound to one pool.
#[derive(Debug, Clone, PartialEq)]
pub struct BgpAdvertisement {
    pub name: String,
    pub aggregation_length: u8,
    pub aggregation_length_v6: u8,
    pub local_pref: u32,
    pub communities: BTreeSet<BgpCommunity>,
    /// Names of the nodes allowed to announce
    pub nodes: BTreeSet<String>,
    /// Peer names; empty means every peer
    pub peers: Vec<String>,
}

impl BgpAdvertisement {
    /// Whether the advertisement is sent to `peer`.
    pub fn targets_peer(&self, peer: &str) -> bool {
        self.peers.is_empty() || self.peers.iter().any(|p| p == peer)
    }
}

/// An L2 advertisement bound to one pool.
#[derive(Debug, Clone, PartialEq)]
pub struct L2Advertisement {
    pub name: String,
    pub nodes: BTreeSet<String>,
    pub interfaces: Vec<String>,
    pub all_interfaces: bool,
}

/// A BGP peer with every reference resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub name: String,
    pub my_asn: u32,
    pub asn: u32,
    pub dynamic_asn: Option<DynamicAsnMode>,
    pub addr: Option<IpAddr>,
    pub src_addr: Option<IpAddr>,
    pub iface: Option<String>,
    pub port: u16,
    pub hold_time: Option<Duration>,
    pub keepalive_time: Option<Duration>,
    pub connect_time: Option<Duration>,
    pub router_id: Option<IpAddr>,
    pub node_selectors: Vec<Selector>,
    pub password: RedactedString,
    pub password_secret: Option<SecretReference>,
    pub bfd_profile: Option<String>,
    pub ebgp_multihop: bool,
    pub vrf: String,
    pub enable_graceful_restart: bool,
    pub disable_mp: bool,
    pub dual_stack_address_family: bool,
    pub extra: Option<String>,
}

impl Peer {
    /// Whether two peers describe the same session, ignoring their names.
    pub fn same_session(&self, other: &Peer) -> bool {
        let unnamed = |p: &Peer| Peer {
            name: String::new(),
            ..p.clone()
        };
        unnamed(self) == unnamed(other)
    }

    /// Whether the peer applies to a node carrying `labels`.
    pub fn selects_node(&self, labels: &BTreeMap<String, String>) -> bool {
        any_matches(&self.node_selectors, labels)
    }
}

/// A resolved BFD profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfdProfile {
    pub name: String,
    pub receive_interval: Option<u32>,
    pub transmit_interval: Option<u32>,
    pub detect_multiplier: Option<u32>,
    pub echo_interval: Option<u32>,
    pub echo_mode: bool,
    pub passive_mode: bool,
    pub minimum_ttl: Option<u32>,
}

/// Builds a [`Config`] from canonicalized resources.
///
/// The validation policy runs first; structural checks always run. Fails
/// on the first unresolved reference or conflict and never returns a
/// partial configuration.
pub fn build_config(resources: &ClusterResources, validation: Validation) -> Result<Config, ConfigError> {
    validation.check(resources)?;

    let bfd_profiles = bfd_profiles_from(&resources.bfd_profiles)?;

    let mut peers: BTreeMap<String, Peer> = BTreeMap::new();
    for cr in &resources.peers {
        let peer = peer_from_cr(cr, &bfd_profiles, &resources.password_secrets, &resources.bgp_extras)?;
        if peers.values().any(|existing| existing.same_session(&peer)) {
            return Err(ConfigError::DuplicatePeer(peer.name));
        }
        peers.insert(peer.name.clone(), peer);
    }

    let aliases = community_aliases(&resources.communities)?;
    let mut pools = pools_from(resources, &aliases)?;

    for adv in &resources.bgp_advertisements {
        bind_bgp_advertisement(adv, &mut pools, resources, &aliases)?;
    }
    for adv in &resources.l2_advertisements {
        bind_l2_advertisement(adv, &mut pools, resources)?;
    }

    let config = Config {
        pools: Pools { by_name: pools },
        peers,
        bfd_profiles,
    };
    validate_config(&config)?;

    debug!(
        pools = config.pools.by_name.len(),
        peers = config.peers.len(),
        bfd_profiles = config.bfd_profiles.len(),
        "built configuration"
    );
    Ok(config)
}

fn check_range(profile: &str, field: &str, value: Option<u32>, min: u32, max: u32) -> Result<(), ConfigError> {
    match value {
        Some(v) if v < min || v > max => Err(ConfigError::InvalidBfdProfile {
            profile: profile.to_string(),
            reason: format!("invalid {field} {v}: must be between {min} and {max}"),
        }),
        _ => Ok(()),
    }
}

fn bfd_profiles_from(crs: &[BFDProfile]) -> Result<BTreeMap<String, BfdProfile>, ConfigError> {
    let mut profiles = BTreeMap::new();
    for cr in crs {
        let name = cr.name_any();
        let spec = &cr.spec;
        check_range(&name, "receive interval", spec.receive_interval, 10, 60000)?;
        check_range(&name, "transmit interval", spec.transmit_interval, 10, 60000)?;
        check_range(&name, "detect multiplier", spec.detect_multiplier, 2, 255)?;
        check_range(&name, "echo interval", spec.echo_interval, 10, 60000)?;
        check_range(&name, "minimum ttl", spec.minimum_ttl, 1, 254)?;

        if profiles.contains_key(&name) {
            return Err(ConfigError::DuplicateBfdProfile(name));
        }
        profiles.insert(
            name.clone(),
            BfdProfile {
                name,
                receive_interval: spec.receive_interval,
                transmit_interval: spec.transmit_interval,
                detect_multiplier: spec.detect_multiplier,
                echo_interval: spec.echo_interval,
                echo_mode: spec.echo_mode.unwrap_or(false),
                passive_mode: spec.passive_mode.unwrap_or(false),
                minimum_ttl: spec.minimum_ttl,
            },
        );
    }
    Ok(profiles)
}

fn parse_ip(peer: &str, what: &str, raw: &str) -> Result<IpAddr, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::peer(peer, format!("invalid {what} {raw:?}")))
}

fn parse_timer(peer: &str, field: &'static str, raw: Option<&String>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|r| {
        parse_duration(r).map_err(|source| ConfigError::InvalidPeerTimer {
            peer: peer.to_string(),
            field,
            source,
        })
    })
    .transpose()
}

/// Whole seconds; the BGP timers have second granularity.
fn round_to_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

fn peer_from_cr(
    cr: &BGPPeer,
    bfd_profiles: &BTreeMap<String, BfdProfile>,
    secrets: &BTreeMap<String, Secret>,
    extras: &BTreeMap<String, String>,
) -> Result<Peer, ConfigError> {
    let name = cr.name_any();
    let spec = &cr.spec;

    if spec.my_asn == 0 {
        return Err(ConfigError::peer(&name, "missing local ASN"));
    }
    if spec.peer_asn == 0 && spec.dynamic_asn.is_none() {
        return Err(ConfigError::peer(&name, "missing peer ASN"));
    }
    if spec.peer_asn != 0 && spec.dynamic_asn.is_some() {
        return Err(ConfigError::peer(&name, "both peerASN and dynamicASN are set"));
    }
    if spec.ebgp_multi_hop && spec.my_asn == spec.peer_asn {
        return Err(ConfigError::peer(&name, "invalid ebgpMultiHop parameter set for an ibgp peer"));
    }

    let iface = spec.interface.clone().filter(|i| !i.is_empty());
    let addr = match (spec.peer_address.is_empty(), &iface) {
        (true, Some(_)) => None,
        (false, Some(_)) => {
            return Err(ConfigError::peer(&name, "peerAddress and interface are mutually exclusive"));
        }
        (_, None) => Some(parse_ip(&name, "peer IP", &spec.peer_address)?),
    };
    let src_addr = spec
        .source_address
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| parse_ip(&name, "source IP", s))
        .transpose()?;
    let router_id = spec
        .router_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| parse_ip(&name, "router ID", s))
        .transpose()?;

    let mut hold_time = parse_timer(&name, "hold time", spec.hold_time.as_ref())?.map(round_to_secs);
    let mut keepalive_time = parse_timer(&name, "keepalive time", spec.keepalive_time.as_ref())?;
    if let Some(ht) = hold_time {
        if !ht.is_zero() && ht < Duration::from_secs(3) {
            return Err(ConfigError::peer(
                &name,
                format!("invalid hold time {:?}: must be 0 or >=3s", spec.hold_time.as_deref().unwrap_or_default()),
            ));
        }
    }
    match (hold_time, keepalive_time) {
        (Some(ht), Some(ka)) if ka > ht => {
            return Err(ConfigError::peer(
                &name,
                format!("invalid keepaliveTime {ka:?}: must be lower than holdTime {ht:?}"),
            ));
        }
        (Some(ht), None) => keepalive_time = Some(ht / 3),
        (None, Some(ka)) => hold_time = Some(ka * 3),
        _ => {}
    }
    let connect_time = parse_timer(&name, "connect time", spec.connect_time.as_ref())?;
    if let Some(ct) = connect_time {
        if ct < Duration::from_secs(1) || ct > Duration::from_secs(65535) {
            return Err(ConfigError::peer(
                &name,
                format!("invalid connect time {ct:?}: must be between 1s and 65535s"),
            ));
        }
    }

    let node_selectors = Selector::compile_all(&spec.node_selectors)
        .map_err(|e| ConfigError::selector(format!("peer {name}"), e))?;

    let password = match (&spec.password, &spec.password_secret) {
        (Some(p), Some(_)) if !p.is_empty() => {
            return Err(ConfigError::PasswordSecret {
                peer: name,
                reason: "can not have both password and secret ref set in peer config".to_string(),
            });
        }
        (_, Some(secret_ref)) => password_from_secret(&name, secret_ref, secrets)?,
        (Some(p), None) => RedactedString::new(p.clone()),
        (None, None) => RedactedString::default(),
    };

    let bfd_profile = spec.bfd_profile.clone().filter(|p| !p.is_empty());
    if let Some(profile) = &bfd_profile {
        if !bfd_profiles.contains_key(profile) {
            return Err(ConfigError::MissingBfdProfile {
                peer: name,
                profile: profile.clone(),
            });
        }
    }

    Ok(Peer {
        extra: extras.get(&name).cloned(),
        name,
        my_asn: spec.my_asn,
        asn: spec.peer_asn,
        dynamic_asn: spec.dynamic_asn,
        addr,
        src_addr,
        iface,
        port: spec.peer_port.unwrap_or(DEFAULT_BGP_PORT),
        hold_time,
        keepalive_time,
        connect_time,
        router_id,
        node_selectors,
        password,
        password_secret: spec.password_secret.clone(),
        bfd_profile,
        ebgp_multihop: spec.ebgp_multi_hop,
        vrf: spec.vrf.clone().unwrap_or_default(),
        enable_graceful_restart: spec.enable_graceful_restart,
        disable_mp: spec.disable_mp,
        dual_stack_address_family: spec.dual_stack_address_family,
    })
}

fn password_from_secret(
    peer: &str,
    secret_ref: &SecretReference,
    secrets: &BTreeMap<String, Secret>,
) -> Result<RedactedString, ConfigError> {
    let fail = |reason: String| ConfigError::PasswordSecret {
        peer: peer.to_string(),
        reason,
    };
    let namespace = secret_ref.namespace.as_deref().unwrap_or_default();
    let secret = secrets
        .get(&secret_ref.name)
        .ok_or_else(|| fail(format!("secret ref not found for peer config {namespace:?}/{:?}", secret_ref.name)))?;
    let secret_type = secret.type_.as_deref().unwrap_or_default();
    if secret_type != SECRET_TYPE_BASIC_AUTH {
        return Err(fail(format!(
            "secret type mismatch on {namespace:?}/{:?}, type {SECRET_TYPE_BASIC_AUTH:?} is expected",
            secret_ref.name
        )));
    }
    let from_data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(SECRET_PASSWORD_KEY))
        .map(|b| String::from_utf8_lossy(&b.0).into_owned());
    let from_string_data = secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(SECRET_PASSWORD_KEY))
        .cloned();
    from_data
        .or(from_string_data)
        .map(RedactedString::new)
        .ok_or_else(|| fail(format!("password not specified in the secret {namespace:?}/{:?}", secret_ref.name)))
}

fn community_aliases(crs: &[Community]) -> Result<BTreeMap<String, BgpCommunity>, ConfigError> {
    let mut aliases = BTreeMap::new();
    for cr in crs {
        let owner = cr.name_any();
        for alias in &cr.spec.communities {
            let value: BgpCommunity =
                alias
                    .value
                    .parse()
                    .map_err(|source| ConfigError::InvalidCommunityAlias {
                        owner: owner.clone(),
                        alias: alias.name.clone(),
                        source,
                    })?;
            if aliases.insert(alias.name.clone(), value).is_some() {
                return Err(ConfigError::DuplicateCommunityAlias(alias.name.clone()));
            }
        }
    }
    Ok(aliases)
}

fn parse_ranges(pool: &str, addresses: &[String]) -> Result<Vec<AddressRange>, ConfigError> {
    if pool.is_empty() {
        return Err(ConfigError::InvalidPool {
            pool: String::new(),
            reason: "missing pool name".to_string(),
        });
    }
    if addresses.is_empty() {
        return Err(ConfigError::InvalidPool {
            pool: pool.to_string(),
            reason: "pool has no prefixes defined".to_string(),
        });
    }
    addresses
        .iter()
        .map(|raw| {
            AddressRange::parse(raw).map_err(|source| ConfigError::InvalidCidr {
                pool: pool.to_string(),
                cidr: raw.clone(),
                source,
            })
        })
        .collect()
}

fn check_overlaps(pool: &str, ranges: &[AddressRange], seen: &mut Vec<IpNet>) -> Result<(), ConfigError> {
    for net in ranges.iter().flat_map(|r| r.cidrs.iter()) {
        if let Some(existing) = seen.iter().find(|m| cidr::cidrs_overlap(net, m)) {
            return Err(ConfigError::OverlappingCidr {
                cidr: net.to_string(),
                pool: pool.to_string(),
                existing: existing.to_string(),
            });
        }
        seen.push(*net);
    }
    Ok(())
}

fn service_allocation_from(pool: &IPAddressPool) -> Result<Option<ServiceAllocation>, ConfigError> {
    let Some(sa) = &pool.spec.service_allocation else {
        return Ok(None);
    };
    let owner = format!("pool {} serviceAllocation", pool.name_any());
    let compile = |sels: &[LabelSelector]| {
        sels.iter()
            .map(Selector::compile)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::selector(owner.clone(), e))
    };
    Ok(Some(ServiceAllocation {
        priority: sa.priority.unwrap_or(0),
        namespaces: sa.namespaces.iter().cloned().collect(),
        namespace_selectors: compile(&sa.namespace_selectors)?,
        service_selectors: compile(&sa.service_selectors)?,
    }))
}

fn pools_from(
    resources: &ClusterResources,
    aliases: &BTreeMap<String, BgpCommunity>,
) -> Result<BTreeMap<String, Pool>, ConfigError> {
    let mut pools = BTreeMap::new();
    let mut seen_cidrs = Vec::new();

    for cr in &resources.pools {
        let name = cr.name_any();
        let ranges = parse_ranges(&name, &cr.spec.addresses)?;
        if pools.contains_key(&name) {
            return Err(ConfigError::DuplicatePool(name));
        }
        check_overlaps(&name, &ranges, &mut seen_cidrs)?;
        pools.insert(
            name.clone(),
            Pool {
                service_allocation: service_allocation_from(cr)?,
                name,
                ranges,
                auto_assign: cr.spec.auto_assign.unwrap_or(true),
                avoid_buggy_ips: cr.spec.avoid_buggy_ips,
                bgp_advertisements: Vec::new(),
                l2_advertisements: Vec::new(),
            },
        );
    }

    for cr in &resources.legacy_pools {
        let pool = legacy_pool(cr, resources, aliases)?;
        if pools.contains_key(&pool.name) {
            return Err(ConfigError::DuplicatePool(pool.name));
        }
        check_overlaps(&pool.name, &pool.ranges, &mut seen_cidrs)?;
        pools.insert(pool.name.clone(), pool);
    }

    Ok(pools)
}

fn all_node_names(nodes: &[Node]) -> BTreeSet<String> {
    nodes.iter().map(ResourceExt::name_any).collect()
}

fn legacy_pool(
    cr: &AddressPool,
    resources: &ClusterResources,
    aliases: &BTreeMap<String, BgpCommunity>,
) -> Result<Pool, ConfigError> {
    let name = cr.name_any();
    let ranges = parse_ranges(&name, &cr.spec.addresses)?;
    let invalid = |reason: &str| ConfigError::InvalidPool {
        pool: name.clone(),
        reason: reason.to_string(),
    };

    let mut pool = Pool {
        name: name.clone(),
        ranges,
        auto_assign: cr.spec.auto_assign.unwrap_or(true),
        avoid_buggy_ips: cr.spec.avoid_buggy_ips,
        service_allocation: None,
        bgp_advertisements: Vec::new(),
        l2_advertisements: Vec::new(),
    };

    match cr.spec.protocol.as_str() {
        "layer2" => {
            if !cr.spec.bgp_advertisements.is_empty() {
                return Err(invalid(
                    "cannot have bgp-advertisements configuration element in a layer2 address pool",
                ));
            }
            pool.l2_advertisements.push(L2Advertisement {
                name: format!("{name}-l2"),
                nodes: all_node_names(&resources.nodes),
                interfaces: Vec::new(),
                all_interfaces: true,
            });
        }
        "bgp" => {
            if cr.spec.bgp_advertisements.is_empty() {
                pool.bgp_advertisements.push(BgpAdvertisement {
                    name: format!("{name}-bgp"),
                    aggregation_length: 32,
                    aggregation_length_v6: 128,
                    local_pref: 0,
                    communities: BTreeSet::new(),
                    nodes: all_node_names(&resources.nodes),
                    peers: Vec::new(),
                });
            }
            for (i, legacy) in cr.spec.bgp_advertisements.iter().enumerate() {
                let adv_name = format!("{name}-bgp-{i}");
                let (v4, v6) = aggregation_lengths(&adv_name, legacy.aggregation_length, legacy.aggregation_length_v6)?;
                check_aggregation(&adv_name, &pool, v4, v6)?;
                pool.bgp_advertisements.push(BgpAdvertisement {
                    communities: resolve_communities(&adv_name, &legacy.communities, aliases)?,
                    name: adv_name,
                    aggregation_length: v4,
                    aggregation_length_v6: v6,
                    local_pref: legacy.local_pref.unwrap_or(0),
                    nodes: all_node_names(&resources.nodes),
                    peers: Vec::new(),
                });
            }
        }
        "" => return Err(invalid("address pool is missing the protocol field")),
        other => return Err(invalid(&format!("unknown protocol {other:?}"))),
    }

    Ok(pool)
}

fn aggregation_lengths(adv: &str, v4: Option<i32>, v6: Option<i32>) -> Result<(u8, u8), ConfigError> {
    let v4 = v4.unwrap_or(32);
    let v6 = v6.unwrap_or(128);
    let v4 = u8::try_from(v4)
        .ok()
        .filter(|l| *l <= 32)
        .ok_or_else(|| ConfigError::bgp_adv(adv, format!("invalid aggregation length {v4} for IPv4")))?;
    let v6 = u8::try_from(v6)
        .ok()
        .filter(|l| *l <= 128)
        .ok_or_else(|| ConfigError::bgp_adv(adv, format!("invalid aggregation length {v6} for IPv6")))?;
    Ok((v4, v6))
}

/// Rejects an aggregation length shorter than the widest prefix of any
/// address range of the pool.
fn check_aggregation(adv: &str, pool: &Pool, v4: u8, v6: u8) -> Result<(), ConfigError> {
    for range in &pool.ranges {
        if let Some((prefix, length)) = range.incompatible_aggregation(v4, v6) {
            return Err(ConfigError::bgp_adv(
                adv,
                format!(
                    "invalid aggregation length {length}: prefix {prefix} in this pool is more specific than the aggregation length for addresses {}",
                    range.raw
                ),
            ));
        }
    }
    Ok(())
}

fn resolve_communities(
    adv: &str,
    raw: &[String],
    aliases: &BTreeMap<String, BgpCommunity>,
) -> Result<BTreeSet<BgpCommunity>, ConfigError> {
    let mut out = BTreeSet::new();
    for c in raw {
        let value = match aliases.get(c) {
            Some(v) => *v,
            None => c
                .parse()
                .map_err(|e| ConfigError::bgp_adv(adv, format!("invalid community {c:?}: {e}")))?,
        };
        if !out.insert(value) {
            return Err(ConfigError::bgp_adv(adv, format!("duplicate definition of community {c:?}")));
        }
    }
    Ok(out)
}

/// Names of the pools an advertisement applies to.
///
/// With neither names nor selectors every `IPAddressPool` is selected.
pub(crate) fn selected_pools(
    names: &[String],
    selectors: &[LabelSelector],
    pools: &[IPAddressPool],
) -> Result<BTreeSet<String>, String> {
    if names.is_empty() && selectors.is_empty() {
        return Ok(pools.iter().map(ResourceExt::name_any).collect());
    }

    let mut selected = BTreeSet::new();
    for name in names {
        if !pools.iter().any(|p| p.name_any() == *name) {
            return Err(format!("pool {name:?} not found"));
        }
        if !selected.insert(name.clone()) {
            return Err(format!("duplicate definition of pool {name:?}"));
        }
    }
    for selector in selectors {
        let compiled = Selector::compile(selector).map_err(|e| e.to_string())?;
        selected.extend(
            pools
                .iter()
                .filter(|p| compiled.matches(p.labels()))
                .map(ResourceExt::name_any),
        );
    }
    Ok(selected)
}

fn selected_nodes(owner: &str, selectors: &[LabelSelector], nodes: &[Node]) -> Result<BTreeSet<String>, ConfigError> {
    let compiled = Selector::compile_all(selectors).map_err(|e| ConfigError::selector(owner, e))?;
    Ok(nodes
        .iter()
        .filter(|n| any_matches(&compiled, n.labels()))
        .map(ResourceExt::name_any)
        .collect())
}

fn bind_bgp_advertisement(
    cr: &BGPAdvertisement,
    pools: &mut BTreeMap<String, Pool>,
    resources: &ClusterResources,
    aliases: &BTreeMap<String, BgpCommunity>,
) -> Result<(), ConfigError> {
    let name = cr.name_any();
    let spec = &cr.spec;
    let (v4, v6) = aggregation_lengths(&name, spec.aggregation_length, spec.aggregation_length_v6)?;
    let communities = resolve_communities(&name, &spec.communities, aliases)?;
    let nodes = selected_nodes(&format!("bgp advertisement {name}"), &spec.node_selectors, &resources.nodes)?;
    let selected = selected_pools(&spec.ip_address_pools, &spec.ip_address_pool_selectors, &resources.pools)
        .map_err(|reason| ConfigError::bgp_adv(&name, reason))?;

    for pool_name in selected {
        let Some(pool) = pools.get_mut(&pool_name) else {
            continue;
        };
        check_aggregation(&name, pool, v4, v6)?;
        pool.bgp_advertisements.push(BgpAdvertisement {
            name: name.clone(),
            aggregation_length: v4,
            aggregation_length_v6: v6,
            local_pref: spec.local_pref.unwrap_or(0),
            communities: communities.clone(),
            nodes: nodes.clone(),
            peers: spec.peers.clone(),
        });
    }
    Ok(())
}

fn bind_l2_advertisement(
    cr: &L2AdvertisementCr,
    pools: &mut BTreeMap<String, Pool>,
    resources: &ClusterResources,
) -> Result<(), ConfigError> {
    let name = cr.name_any();
    let spec = &cr.spec;
    let nodes = selected_nodes(&format!("l2 advertisement {name}"), &spec.node_selectors, &resources.nodes)?;
    let selected = selected_pools(&spec.ip_address_pools, &spec.ip_address_pool_selectors, &resources.pools)
        .map_err(|reason| ConfigError::InvalidL2Advertisement {
            adv: name.clone(),
            reason,
        })?;

    for pool_name in selected {
        if let Some(pool) = pools.get_mut(&pool_name) {
            pool.l2_advertisements.push(L2Advertisement {
                name: name.clone(),
                nodes: nodes.clone(),
                interfaces: spec.interfaces.clone(),
                all_interfaces: spec.interfaces.is_empty(),
            });
        }
    }
    Ok(())
}
