//! In-memory implementations of the client traits for unit testing.
//!
//! The mocks share their state through `Arc`s, so a clone handed to the
//! code under test observes and mutates the same store the test inspects.

use crate::error::ClientError;
use crate::frr::FrrConfigClient;
use crate::pool_status::PoolStatusWriter;
use crate::reader::ResourceReader;
use crate::status::ConditionWriter;
use async_trait::async_trait;
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, Condition,
    ConfigurationResult, ConfigurationState, ConfigurationStateSpec, ConfigurationStateStatus,
    FRRConfiguration, FRRConfigurationSpec, IPAddressPool, IPAddressPoolStatus, L2Advertisement,
};
use k8s_openapi::api::core::v1::{Namespace, Node, Secret, Service};
use lb_config::ClusterResources;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fails the next `n` calls of a mock.
#[derive(Clone, Default)]
struct FailureBudget(Arc<AtomicUsize>);

impl FailureBudget {
    fn set(&self, n: usize) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn check(&self, op: &str) -> Result<(), ClientError> {
        let taken = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if taken {
            Err(ClientError::Api(format!("injected failure in {op}")))
        } else {
            Ok(())
        }
    }
}

/// Mock [`ResourceReader`] serving a mutable [`ClusterResources`].
///
/// Secrets are served from `password_secrets`.
#[derive(Clone, Default)]
pub struct MockReader {
    resources: Arc<Mutex<ClusterResources>>,
    services: Arc<Mutex<Vec<Service>>>,
    failures: FailureBudget,
    snapshots: Arc<AtomicUsize>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: ClusterResources) -> Self {
        let reader = Self::default();
        reader.set_resources(resources);
        reader
    }

    pub fn set_resources(&self, resources: ClusterResources) {
        *lock(&self.resources) = resources;
    }

    /// Mutates the served resources in place.
    pub fn update(&self, f: impl FnOnce(&mut ClusterResources)) {
        f(&mut lock(&self.resources));
    }

    pub fn add_service(&self, service: Service) {
        lock(&self.services).push(service);
    }

    pub fn set_services(&self, services: Vec<Service>) {
        *lock(&self.services) = services;
    }

    /// Makes the next `n` list calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.set(n);
    }

    /// How many times the pool list was read, i.e. snapshots taken.
    pub fn snapshots(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    fn read<T>(&self, op: &str, f: impl FnOnce(&ClusterResources) -> T) -> Result<T, ClientError> {
        self.failures.check(op)?;
        Ok(f(&lock(&self.resources)))
    }
}

#[async_trait]
impl ResourceReader for MockReader {
    async fn list_pools(&self) -> Result<Vec<IPAddressPool>, ClientError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.read("list_pools", |r| r.pools.clone())
    }

    async fn list_legacy_pools(&self) -> Result<Vec<AddressPool>, ClientError> {
        self.read("list_legacy_pools", |r| r.legacy_pools.clone())
    }

    async fn list_peers(&self) -> Result<Vec<BGPPeer>, ClientError> {
        self.read("list_peers", |r| r.peers.clone())
    }

    async fn list_bfd_profiles(&self) -> Result<Vec<BFDProfile>, ClientError> {
        self.read("list_bfd_profiles", |r| r.bfd_profiles.clone())
    }

    async fn list_bgp_advertisements(&self) -> Result<Vec<BGPAdvertisement>, ClientError> {
        self.read("list_bgp_advertisements", |r| r.bgp_advertisements.clone())
    }

    async fn list_l2_advertisements(&self) -> Result<Vec<L2Advertisement>, ClientError> {
        self.read("list_l2_advertisements", |r| r.l2_advertisements.clone())
    }

    async fn list_communities(&self) -> Result<Vec<Community>, ClientError> {
        self.read("list_communities", |r| r.communities.clone())
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, ClientError> {
        self.read("get_secret", |r| r.password_secrets.get(name).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClientError> {
        self.read("list_nodes", |r| r.nodes.clone())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, ClientError> {
        self.read("get_node", |r| r.nodes.iter().find(|n| n.metadata.name.as_deref() == Some(name)).cloned())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        self.read("list_namespaces", |r| r.namespaces.clone())
    }

    async fn get_bgp_extras(&self) -> Result<BTreeMap<String, String>, ClientError> {
        self.read("get_bgp_extras", |r| r.bgp_extras.clone())
    }

    async fn list_services(&self) -> Result<Vec<Service>, ClientError> {
        self.failures.check("list_services")?;
        Ok(lock(&self.services).clone())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ClientError> {
        self.failures.check("get_service")?;
        Ok(lock(&self.services)
            .iter()
            .find(|s| s.metadata.namespace.as_deref() == Some(namespace) && s.metadata.name.as_deref() == Some(name))
            .cloned())
    }
}

/// Mock [`ConditionWriter`] emulating server-side apply ownership.
///
/// Each condition type is owned by the field manager that last applied it.
/// Applying a set removes the entries the manager owned but left out, and
/// updates existing entries in place so list positions are stable.
#[derive(Clone, Default)]
pub struct MockStatusStore {
    objects: Arc<Mutex<HashMap<String, ConfigurationState>>>,
    owners: Arc<Mutex<HashMap<(String, String), String>>>,
    writes: Arc<AtomicUsize>,
    failures: FailureBudget,
}

impl MockStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object, e.g. one carrying stale conditions.
    pub fn insert(&self, state: ConfigurationState) {
        let name = state.metadata.name.clone().unwrap_or_default();
        lock(&self.objects).insert(name, state);
    }

    pub fn status(&self, name: &str) -> Option<ConfigurationStateStatus> {
        lock(&self.objects).get(name).and_then(|o| o.status.clone())
    }

    pub fn conditions(&self, name: &str) -> Vec<Condition> {
        self.status(name).map(|s| s.conditions).unwrap_or_default()
    }

    pub fn condition(&self, name: &str, type_: &str) -> Option<Condition> {
        self.conditions(name).into_iter().find(|c| c.type_ == type_)
    }

    /// Number of successful status writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.set(n);
    }

    fn with_status<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut ConfigurationStateStatus) -> T,
    ) -> Result<T, ClientError> {
        let mut objects = lock(&self.objects);
        let object = objects
            .get_mut(name)
            .ok_or_else(|| ClientError::NotFound(format!("ConfigurationState {name}")))?;
        let out = f(object.status.get_or_insert_with(Default::default));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(out)
    }
}

#[async_trait]
impl ConditionWriter for MockStatusStore {
    async fn get(&self, name: &str) -> Result<Option<ConfigurationState>, ClientError> {
        Ok(lock(&self.objects).get(name).cloned())
    }

    async fn ensure_exists(&self, name: &str) -> Result<(), ClientError> {
        self.failures.check("ensure_exists")?;
        lock(&self.objects)
            .entry(name.to_string())
            .or_insert_with(|| ConfigurationState::new(name, ConfigurationStateSpec {}));
        Ok(())
    }

    async fn apply_conditions(
        &self,
        name: &str,
        field_manager: &str,
        conditions: Vec<Condition>,
    ) -> Result<(), ClientError> {
        self.failures.check("apply_conditions")?;
        let mut owners = lock(&self.owners);
        self.with_status(name, |status| {
            status.conditions.retain(|c| {
                let owned = owners.get(&(name.to_string(), c.type_.clone())).map(String::as_str)
                    == Some(field_manager);
                !owned || conditions.iter().any(|n| n.type_ == c.type_)
            });
            for condition in conditions {
                owners.insert((name.to_string(), condition.type_.clone()), field_manager.to_string());
                match status.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
                    Some(existing) => *existing = condition,
                    None => status.conditions.push(condition),
                }
            }
        })
    }

    async fn apply_summary(
        &self,
        name: &str,
        _field_manager: &str,
        result: ConfigurationResult,
        error_summary: String,
    ) -> Result<(), ClientError> {
        self.failures.check("apply_summary")?;
        self.with_status(name, |status| {
            status.result = Some(result);
            status.error_summary = Some(error_summary);
        })
    }
}

/// Mock [`FrrConfigClient`]. The generation is bumped only when a write
/// changes the spec, as the API server does.
#[derive(Clone, Default)]
pub struct MockFrrClient {
    objects: Arc<Mutex<HashMap<String, FRRConfiguration>>>,
    writes: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    failures: FailureBudget,
}

impl MockFrrClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spec(&self, name: &str) -> Option<FRRConfigurationSpec> {
        lock(&self.objects).get(name).map(|o| o.spec.clone())
    }

    pub fn generation(&self, name: &str) -> Option<i64> {
        lock(&self.objects).get(name).and_then(|o| o.metadata.generation)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.objects).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of create/update calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.set(n);
    }
}

#[async_trait]
impl FrrConfigClient for MockFrrClient {
    async fn get(&self, name: &str) -> Result<Option<FRRConfiguration>, ClientError> {
        Ok(lock(&self.objects).get(name).cloned())
    }

    async fn create_or_update(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        spec: &FRRConfigurationSpec,
    ) -> Result<(), ClientError> {
        self.failures.check("create_or_update")?;
        let mut objects = lock(&self.objects);
        let object = objects.entry(name.to_string()).or_insert_with(|| {
            let mut fresh = FRRConfiguration::new(name, spec.clone());
            fresh.metadata.generation = Some(1);
            fresh
        });
        if object.spec != *spec {
            object.spec = spec.clone();
            object.metadata.generation = Some(object.metadata.generation.unwrap_or(0) + 1);
        }
        object.metadata.labels = Some(labels.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        self.failures.check("delete")?;
        if lock(&self.objects).remove(name).is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Mock [`PoolStatusWriter`] recording the last status per pool.
#[derive(Clone, Default)]
pub struct MockPoolStatusWriter {
    statuses: Arc<Mutex<HashMap<String, IPAddressPoolStatus>>>,
    writes: Arc<AtomicUsize>,
}

impl MockPoolStatusWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, pool: &str) -> Option<IPAddressPoolStatus> {
        lock(&self.statuses).get(pool).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolStatusWriter for MockPoolStatusWriter {
    async fn patch_pool_status(&self, name: &str, status: &IPAddressPoolStatus) -> Result<(), ClientError> {
        lock(&self.statuses).insert(name.to_string(), status.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
