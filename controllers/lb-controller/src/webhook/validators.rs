//! Admission checks for the load-balancer resource kinds.
//!
//! Every check lists the existing objects of its kind and the kinds they
//! cross-reference, splices the candidate into that set and runs the config
//! builder over the result; the builder's error is the denial message.
//! The listing happens at admission time, so two concurrent admissions of
//! different objects of one kind can both pass while conflicting with each
//! other. The reconcilers' own build surfaces such conflicts in status.

use async_trait::async_trait;
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, IPAddressPool,
    L2Advertisement,
};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube::core::admission::Operation;
use lb_client::{ClientError, ResourceReader};
use lb_config::{AddressRange, ClusterResources, Selector, Validation, build_config};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Decides whether one admission request for `K` is allowed.
///
/// `Err` carries the denial message shown to the user.
#[async_trait]
pub trait AdmissionCheck<K>: Send + Sync {
    async fn admit(&self, operation: &Operation, object: Option<&K>, old: Option<&K>) -> Result<(), String>;
}

/// Validators for every kind, sharing one read-only view of the cluster.
pub struct Validators {
    reader: Arc<dyn ResourceReader>,
    namespace: String,
    validation: Validation,
}

impl Validators {
    pub fn new(reader: Arc<dyn ResourceReader>, namespace: impl Into<String>, validation: Validation) -> Self {
        Self {
            reader,
            namespace: namespace.into(),
            validation,
        }
    }

    fn check_namespace<K: ResourceExt>(&self, operation: &Operation, object: &K) -> Result<(), String> {
        if *operation == Operation::Create && object.namespace().as_deref() != Some(self.namespace.as_str()) {
            return Err(format!("resource must be created in {} namespace", self.namespace));
        }
        Ok(())
    }

    fn build(&self, resources: ClusterResources) -> Result<(), String> {
        build_config(&resources.canonicalize(), self.validation)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn password_secrets(&self, peers: &[BGPPeer]) -> Result<BTreeMap<String, Secret>, String> {
        let mut secrets = BTreeMap::new();
        for secret_ref in peers.iter().filter_map(|p| p.spec.password_secret.as_ref()) {
            if secrets.contains_key(&secret_ref.name) {
                continue;
            }
            if let Some(secret) = fetch("Secret", self.reader.get_secret(&secret_ref.name)).await? {
                secrets.insert(secret_ref.name.clone(), secret);
            }
        }
        Ok(secrets)
    }

    /// Rejects a pool whose prefixes are wider than the aggregation length
    /// of an existing BGP advertisement that selects it.
    async fn check_advertisements_of(&self, pool: &IPAddressPool) -> Result<(), String> {
        let name = pool.name_any();
        let ranges = pool
            .spec
            .addresses
            .iter()
            .map(|raw| AddressRange::parse(raw).map_err(|e| format!("invalid address {raw:?} in pool {name}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        let labels = pool.labels();

        for adv in fetch("BGPAdvertisement", self.reader.list_bgp_advertisements()).await? {
            let mut selects = adv.spec.ip_address_pools.contains(&name);
            for selector in &adv.spec.ip_address_pool_selectors {
                if selects {
                    break;
                }
                let compiled = Selector::compile(selector).map_err(|e| {
                    format!(
                        "pool {}/{} validation failed: BGPAdvertisement {}/{} contains invalid ipAddressPoolSelector: {e}",
                        pool.namespace().unwrap_or_default(),
                        name,
                        adv.namespace().unwrap_or_default(),
                        adv.name_any()
                    )
                })?;
                selects = compiled.matches(labels);
            }
            if !selects {
                continue;
            }

            let (Ok(v4), Ok(v6)) = (
                u8::try_from(adv.spec.aggregation_length.unwrap_or(32)),
                u8::try_from(adv.spec.aggregation_length_v6.unwrap_or(128)),
            ) else {
                continue;
            };
            for range in &ranges {
                if let Some((prefix, length)) = range.incompatible_aggregation(v4, v6) {
                    return Err(format!(
                        "pool {} address {} (prefix {}) is incompatible with BGPAdvertisement {} in namespace {} (aggregation length {})",
                        name,
                        range.raw,
                        prefix,
                        adv.name_any(),
                        adv.namespace().unwrap_or_default(),
                        length
                    ));
                }
            }
        }
        Ok(())
    }
}

async fn fetch<T>(kind: &str, request: impl Future<Output = Result<T, ClientError>>) -> Result<T, String> {
    request
        .await
        .map_err(|e| format!("failed to get existing {kind} objects: {e}"))
}

/// The candidate object of a create or update; `None` for other operations.
fn written<'a, K>(operation: &Operation, object: Option<&'a K>) -> Option<&'a K> {
    match operation {
        Operation::Create | Operation::Update => object,
        _ => None,
    }
}

/// Replaces the object of the same name in `existing`, or appends.
pub(crate) fn splice<K: ResourceExt + Clone>(mut existing: Vec<K>, candidate: &K) -> Vec<K> {
    let name = candidate.name_any();
    match existing.iter_mut().find(|e| e.name_any() == name) {
        Some(slot) => *slot = candidate.clone(),
        None => existing.push(candidate.clone()),
    }
    existing
}

#[async_trait]
impl AdmissionCheck<IPAddressPool> for Validators {
    async fn admit(
        &self,
        operation: &Operation,
        object: Option<&IPAddressPool>,
        _old: Option<&IPAddressPool>,
    ) -> Result<(), String> {
        let Some(pool) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating IPAddressPool {} ({:?})", pool.name_any(), operation);
        self.check_namespace(operation, pool)?;

        let resources = ClusterResources {
            pools: splice(fetch("IPAddressPool", self.reader.list_pools()).await?, pool),
            legacy_pools: fetch("AddressPool", self.reader.list_legacy_pools()).await?,
            nodes: fetch("Node", self.reader.list_nodes()).await?,
            ..Default::default()
        };
        self.build(resources)?;
        self.check_advertisements_of(pool).await
    }
}

#[async_trait]
impl AdmissionCheck<AddressPool> for Validators {
    async fn admit(
        &self,
        operation: &Operation,
        object: Option<&AddressPool>,
        _old: Option<&AddressPool>,
    ) -> Result<(), String> {
        let Some(pool) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating AddressPool {} ({:?})", pool.name_any(), operation);
        self.check_namespace(operation, pool)?;

        let resources = ClusterResources {
            legacy_pools: splice(fetch("AddressPool", self.reader.list_legacy_pools()).await?, pool),
            pools: fetch("IPAddressPool", self.reader.list_pools()).await?,
            ..Default::default()
        };
        self.build(resources)
    }
}

#[async_trait]
impl AdmissionCheck<BGPPeer> for Validators {
    async fn admit(&self, operation: &Operation, object: Option<&BGPPeer>, _old: Option<&BGPPeer>) -> Result<(), String> {
        let Some(peer) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating BGPPeer {} ({:?})", peer.name_any(), operation);
        self.check_namespace(operation, peer)?;

        let peers = splice(fetch("BGPPeer", self.reader.list_peers()).await?, peer);
        let password_secrets = self.password_secrets(&peers).await?;
        let resources = ClusterResources {
            peers,
            password_secrets,
            bfd_profiles: fetch("BFDProfile", self.reader.list_bfd_profiles()).await?,
            ..Default::default()
        };
        self.build(resources)
    }
}

#[async_trait]
impl AdmissionCheck<BGPAdvertisement> for Validators {
    async fn admit(
        &self,
        operation: &Operation,
        object: Option<&BGPAdvertisement>,
        _old: Option<&BGPAdvertisement>,
    ) -> Result<(), String> {
        let Some(adv) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating BGPAdvertisement {} ({:?})", adv.name_any(), operation);
        self.check_namespace(operation, adv)?;

        let resources = ClusterResources {
            bgp_advertisements: splice(fetch("BGPAdvertisement", self.reader.list_bgp_advertisements()).await?, adv),
            pools: fetch("IPAddressPool", self.reader.list_pools()).await?,
            communities: fetch("Community", self.reader.list_communities()).await?,
            nodes: fetch("Node", self.reader.list_nodes()).await?,
            ..Default::default()
        };
        self.build(resources)
    }
}

#[async_trait]
impl AdmissionCheck<L2Advertisement> for Validators {
    async fn admit(
        &self,
        operation: &Operation,
        object: Option<&L2Advertisement>,
        _old: Option<&L2Advertisement>,
    ) -> Result<(), String> {
        let Some(adv) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating L2Advertisement {} ({:?})", adv.name_any(), operation);
        self.check_namespace(operation, adv)?;

        let resources = ClusterResources {
            l2_advertisements: splice(fetch("L2Advertisement", self.reader.list_l2_advertisements()).await?, adv),
            pools: fetch("IPAddressPool", self.reader.list_pools()).await?,
            nodes: fetch("Node", self.reader.list_nodes()).await?,
            ..Default::default()
        };
        self.build(resources)
    }
}

#[async_trait]
impl AdmissionCheck<Community> for Validators {
    async fn admit(
        &self,
        operation: &Operation,
        object: Option<&Community>,
        _old: Option<&Community>,
    ) -> Result<(), String> {
        let Some(community) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating Community {} ({:?})", community.name_any(), operation);
        self.check_namespace(operation, community)?;

        let resources = ClusterResources {
            communities: splice(fetch("Community", self.reader.list_communities()).await?, community),
            bgp_advertisements: fetch("BGPAdvertisement", self.reader.list_bgp_advertisements()).await?,
            pools: fetch("IPAddressPool", self.reader.list_pools()).await?,
            ..Default::default()
        };
        self.build(resources)
    }
}

#[async_trait]
impl AdmissionCheck<BFDProfile> for Validators {
    async fn admit(
        &self,
        operation: &Operation,
        object: Option<&BFDProfile>,
        old: Option<&BFDProfile>,
    ) -> Result<(), String> {
        if *operation == Operation::Delete {
            let Some(profile) = old.or(object) else {
                return Ok(());
            };
            let name = profile.name_any();
            let peers = fetch("BGPPeer", self.reader.list_peers()).await?;
            if let Some(peer) = peers.iter().find(|p| p.spec.bfd_profile.as_deref() == Some(name.as_str())) {
                return Err(format!("failed to delete BFDProfile {name}: used by BGPPeer {}", peer.name_any()));
            }
            return Ok(());
        }

        let Some(profile) = written(operation, object) else {
            return Ok(());
        };
        debug!("Validating BFDProfile {} ({:?})", profile.name_any(), operation);
        let peers = fetch("BGPPeer", self.reader.list_peers()).await?;
        let password_secrets = self.password_secrets(&peers).await?;
        let resources = ClusterResources {
            bfd_profiles: splice(fetch("BFDProfile", self.reader.list_bfd_profiles()).await?, profile),
            peers,
            password_secrets,
            ..Default::default()
        };
        self.build(resources)
    }
}
