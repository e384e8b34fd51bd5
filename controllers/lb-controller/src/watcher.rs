//! Kubernetes resource watchers.
//!
//! Two kinds of watches feed the reconcilers:
//! - [`watch_into`] runs a raw `watcher` stream through an [`EventFilter`]
//!   and sends `ResourceChange` triggers for the objects that changed in a
//!   way the receiving reconcilers care about.
//! - [`watch_resource`] wraps `kube_runtime::Controller` for reconcilers
//!   that act on one object kind directly (the aggregate status).

use crate::error::ControllerError;
use crate::trigger::{ObjectKey, ReconcileTrigger, TriggerFanout};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Secret};
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::watcher::{self, Event};
use kube_runtime::{Controller, WatchStreamExt};
use lb_client::BGP_EXTRAS_CONFIGMAP;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Relevant state of an object; `None` marks an object the watch ignores.
pub type Fingerprint<K> = fn(&K) -> Option<String>;

/// Drops watch events that do not change anything relevant.
///
/// The filter remembers the fingerprint of every object it has admitted.
/// After a relist, objects that were not listed again are reported as
/// deleted.
pub struct EventFilter<K> {
    fingerprint: Fingerprint<K>,
    seen: HashMap<ObjectKey, String>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl<K: ResourceExt> EventFilter<K> {
    pub fn new(fingerprint: Fingerprint<K>) -> Self {
        Self {
            fingerprint,
            seen: HashMap::new(),
            relisted: None,
        }
    }

    /// Keys to trigger for `event`.
    pub fn admit(&mut self, event: &Event<K>) -> Vec<ObjectKey> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(obj) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(ObjectKey::from_resource(obj));
                }
                self.apply(obj)
            }
            Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let mut gone: Vec<ObjectKey> = self
                    .seen
                    .keys()
                    .filter(|key| !relisted.contains(*key))
                    .cloned()
                    .collect();
                gone.sort();
                for key in &gone {
                    self.seen.remove(key);
                }
                gone
            }
            Event::Apply(obj) => self.apply(obj),
            Event::Delete(obj) => {
                if (self.fingerprint)(obj).is_none() {
                    return Vec::new();
                }
                let key = ObjectKey::from_resource(obj);
                self.seen.remove(&key);
                vec![key]
            }
        }
    }

    fn apply(&mut self, obj: &K) -> Vec<ObjectKey> {
        let Some(fingerprint) = (self.fingerprint)(obj) else {
            return Vec::new();
        };
        let key = ObjectKey::from_resource(obj);
        if self.seen.get(&key) == Some(&fingerprint) {
            return Vec::new();
        }
        self.seen.insert(key.clone(), fingerprint);
        vec![key]
    }
}

/// Custom resources: spec generation and labels.
pub fn crd_fingerprint<K: ResourceExt>(obj: &K) -> Option<String> {
    Some(json!([obj.meta().generation, obj.labels()]).to_string())
}

/// Nodes: labels, schedulability and network availability.
pub fn node_fingerprint(node: &Node) -> Option<String> {
    let unschedulable = node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false);
    let network_unavailable = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "NetworkUnavailable"))
        .map(|c| c.status.clone());
    Some(json!([node.labels(), unschedulable, network_unavailable]).to_string())
}

pub fn namespace_fingerprint(ns: &Namespace) -> Option<String> {
    Some(json!(ns.labels()).to_string())
}

/// Any write to the object.
pub fn resource_version_fingerprint<K: ResourceExt>(obj: &K) -> Option<String> {
    Some(obj.resource_version().unwrap_or_default())
}

pub fn secret_fingerprint(secret: &Secret) -> Option<String> {
    resource_version_fingerprint(secret)
}

/// Only the `bgpextras` ConfigMap, by content.
pub fn bgp_extras_fingerprint(cm: &ConfigMap) -> Option<String> {
    (cm.name_any() == BGP_EXTRAS_CONFIGMAP).then(|| json!(cm.data).to_string())
}

/// Streams filtered changes of `api` into `sink` until cancelled.
///
/// Watch errors are logged and retried by the stream's backoff.
pub async fn watch_into<K>(
    api: Api<K>,
    config: watcher::Config,
    mut filter: EventFilter<K>,
    sink: TriggerFanout,
    cancel: CancellationToken,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let kind = std::any::type_name::<K>().rsplit("::").next().unwrap_or("object");
    info!("Starting {} watcher", kind);
    let mut stream = watcher::watcher(api, config).default_backoff().boxed();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("{} watcher cancelled", kind);
                return Ok(());
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    for key in filter.admit(&event) {
                        debug!("{} {} changed", kind, key);
                        sink.send(&ReconcileTrigger::ResourceChange(key)).await;
                    }
                }
                Some(Err(e)) => warn!("{} watch error: {}", kind, e),
                None => return Err(ControllerError::Watch(format!("{kind} watch stream ended"))),
            },
        }
    }
}

/// Reconcile function shape accepted by [`watch_resource`].
pub type ReconcileFn<K, C> =
    fn(Arc<C>, Arc<K>) -> Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>>;

/// Runs a `kube_runtime::Controller` over `api` until `cancel` fires.
///
/// Failed reconciles are requeued after a fixed delay.
pub async fn watch_resource<K, C>(
    api: Api<K>,
    config: watcher::Config,
    context: Arc<C>,
    reconcile_fn: ReconcileFn<K, C>,
    resource_name: &'static str,
    cancel: CancellationToken,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + Send + Sync + 'static + Debug + DeserializeOwned,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    C: Send + Sync + 'static,
{
    info!("Starting {} controller", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, _ctx: Arc<C>| {
        error!("Reconciliation error for {} {}: {}", resource_name, obj.name_any(), error);
        Action::requeue(Duration::from_secs(10))
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<C>| {
        debug!("Reconciling {} {}", resource_name, obj.name_any());
        reconcile_fn(ctx, obj)
    };

    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_millis(500))
        .concurrency(1);

    Controller::new(api, config)
        .with_config(controller_config)
        .graceful_shutdown_on(cancel.cancelled_owned())
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            if let Err(e) = res {
                debug!("Controller event for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}
