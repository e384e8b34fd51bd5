//! Reconcile triggers.
//!
//! Every reconciler consumes one typed channel of [`ReconcileTrigger`]s.
//! Watch events become `ResourceChange`s; broad resyncs and status refreshes
//! are explicit variants rather than objects with reserved names.

use kube::ResourceExt;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Capacity of a reconciler's trigger channel.
pub const TRIGGER_CHANNEL_CAPACITY: usize = 1024;

/// Namespace/name pair identifying an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn from_resource<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Why a reconciler should run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReconcileTrigger {
    /// Re-evaluate everything the reconciler owns
    Reload,
    /// Refresh derived status only
    StatusUpdate,
    /// One watched object changed or was deleted
    ResourceChange(ObjectKey),
}

impl fmt::Display for ReconcileTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reload => f.write_str("reload"),
            Self::StatusUpdate => f.write_str("status-update"),
            Self::ResourceChange(key) => write!(f, "change {key}"),
        }
    }
}

pub type TriggerSender = mpsc::Sender<ReconcileTrigger>;
pub type TriggerReceiver = mpsc::Receiver<ReconcileTrigger>;

/// A bounded trigger channel.
pub fn trigger_channel() -> (TriggerSender, TriggerReceiver) {
    mpsc::channel(TRIGGER_CHANNEL_CAPACITY)
}

#[derive(Clone)]
struct Target {
    name: String,
    sender: TriggerSender,
    /// Triggers waiting for channel capacity in a background send
    deferred: Arc<Mutex<HashSet<ReconcileTrigger>>>,
}

/// Fans a trigger out to a fixed set of reconcilers without blocking.
///
/// When a target's channel is full the trigger is handed to a background
/// send instead of being dropped. Repeated fires of the same trigger while
/// it waits coalesce into that one send.
#[derive(Clone, Default)]
pub struct TriggerFanout {
    targets: Vec<Target>,
}

impl TriggerFanout {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_target(mut self, name: impl Into<String>, sender: TriggerSender) -> Self {
        self.targets.push(Target {
            name: name.into(),
            sender,
            deferred: Arc::default(),
        });
        self
    }

    /// Sends `trigger` to every target, waiting for channel capacity.
    /// Closed targets are skipped.
    pub async fn send(&self, trigger: &ReconcileTrigger) {
        for Target { name, sender, .. } in &self.targets {
            if sender.send(trigger.clone()).await.is_err() {
                debug!("Reconciler {} stopped, dropping {}", name, trigger);
            }
        }
    }

    /// Sends `trigger` to every target without waiting.
    pub fn fire(&self, trigger: &ReconcileTrigger) {
        for target in &self.targets {
            match target.sender.try_send(trigger.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(trigger)) => target.defer(trigger),
                Err(TrySendError::Closed(trigger)) => {
                    debug!("Reconciler {} stopped, dropping {}", target.name, trigger);
                }
            }
        }
    }
}

impl Target {
    fn defer(&self, trigger: ReconcileTrigger) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("Channel for {} is full and no runtime is running, dropping {}", self.name, trigger);
            return;
        };
        let fresh = self
            .deferred
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(trigger.clone());
        if !fresh {
            debug!("Coalesced {} for {} into the pending send", trigger, self.name);
            return;
        }

        debug!("Channel for {} is full, deferring {}", self.name, trigger);
        let target = self.clone();
        runtime.spawn(async move {
            if target.sender.send(trigger.clone()).await.is_err() {
                debug!("Reconciler {} stopped, dropping {}", target.name, trigger);
            }
            // Cleared only once queued: a fire in between is served by the queued copy
            target
                .deferred
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&trigger);
        });
    }
}
