//! Speaker-side state: re-renders the node's FRR configuration whenever
//! the config, the node or a service changes.

use super::service_ips;
use crate::frr::{FrrPusher, desired_spec};
use crate::handler::{ConfigHandler, NodeHandler, ServiceHandler, SyncState};
use crate::trigger::ObjectKey;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::ResourceExt;
use lb_config::Config;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Default)]
struct State {
    node_labels: BTreeMap<String, String>,
    config: Option<Config>,
    services: BTreeMap<ObjectKey, BTreeSet<IpAddr>>,
}

pub struct SpeakerState {
    node_name: String,
    state: Mutex<State>,
    pusher: Option<Arc<FrrPusher>>,
}

impl SpeakerState {
    /// `pusher` is `None` for BGP backends other than frr-k8s. Such a
    /// speaker only tracks state and rejects configs that declare peers.
    pub fn new(node_name: impl Into<String>, pusher: Option<Arc<FrrPusher>>) -> Self {
        Self {
            node_name: node_name.into(),
            state: Mutex::new(State::default()),
            pusher,
        }
    }

    fn update(&self, f: impl FnOnce(&mut State)) -> SyncState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);

        let Some(pusher) = &self.pusher else {
            return SyncState::Success;
        };
        // Nothing is rendered before the first valid config.
        let Some(config) = &state.config else {
            return SyncState::Success;
        };
        let ips: BTreeSet<IpAddr> = state.services.values().flatten().copied().collect();
        pusher.update_config(desired_spec(&self.node_name, &state.node_labels, config, &ips));
        SyncState::Success
    }
}

impl ConfigHandler for SpeakerState {
    fn handle(&self, config: &Config) -> SyncState {
        debug!("Speaker {} received a new config", self.node_name);
        let state = self.update(|state| state.config = Some(config.clone()));
        if self.pusher.is_none() && !config.peers.is_empty() {
            // Retrying cannot help until the backend changes.
            warn!("{} BGP peers configured but no BGP backend is driven on this speaker", config.peers.len());
            return SyncState::ErrorNoRetry;
        }
        state
    }
}

impl NodeHandler for SpeakerState {
    fn handle_node(&self, node: &Node) -> SyncState {
        let labels = node.labels().clone();
        self.update(|state| state.node_labels = labels)
    }
}

impl ServiceHandler for SpeakerState {
    fn handle_service(&self, key: &ObjectKey, service: Option<&Service>) -> SyncState {
        let ips = service.map(service_ips).unwrap_or_default();
        self.update(|state| {
            if ips.is_empty() {
                state.services.remove(key);
            } else {
                state.services.insert(key.clone(), ips);
            }
        })
    }
}
