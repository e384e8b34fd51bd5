//! Pushes the node's desired FRR configuration to the API server.
//!
//! Handlers call [`FrrPusher::update_config`] as often as they like; each
//! call only stores the desired spec and signals the debouncer, which turns
//! a burst of signals into one `Reload` for the pusher's reconcile loop.

use crate::error::ControllerError;
use crate::handler::SyncState;
use crate::metrics::ControllerMetrics;
use crate::runner::Reconcile;
use crate::status::ConditionReporter;
use crate::trigger::ReconcileTrigger;
use async_trait::async_trait;
use crds::FRRConfigurationSpec;
use lb_client::FrrConfigClient;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "lb-speaker";
pub const NODE_LABEL: &str = "lb.metallb.io/node";

pub struct FrrPusher {
    client: Arc<dyn FrrConfigClient>,
    object_name: String,
    labels: BTreeMap<String, String>,
    desired: Mutex<Option<FRRConfigurationSpec>>,
    changed: mpsc::UnboundedSender<()>,
    reporter: ConditionReporter,
    metrics: Arc<ControllerMetrics>,
}

impl FrrPusher {
    pub const NAME: &'static str = "frrk8sReconciler";

    /// Returns the pusher and the receiving end of its change signal,
    /// to be fed to [`super::debounce`].
    pub fn new(
        node_name: &str,
        client: Arc<dyn FrrConfigClient>,
        reporter: ConditionReporter,
        metrics: Arc<ControllerMetrics>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (changed, signals) = mpsc::unbounded_channel();
        let labels = BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
            (NODE_LABEL.to_string(), node_name.to_string()),
        ]);
        let pusher = Arc::new(Self {
            client,
            object_name: object_name(node_name),
            labels,
            desired: Mutex::new(None),
            changed,
            reporter,
            metrics,
        });
        (pusher, signals)
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Stores the desired spec; `None` removes the node's object.
    pub fn update_config(&self, spec: Option<FRRConfigurationSpec>) {
        *self.desired.lock().unwrap_or_else(PoisonError::into_inner) = spec;
        if self.changed.send(()).is_err() {
            debug!("FRR debouncer stopped, dropping change signal");
        }
    }

    fn desired(&self) -> Option<FRRConfigurationSpec> {
        self.desired.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn push(&self) -> Result<(), ControllerError> {
        let Some(desired) = self.desired() else {
            debug!("No desired FRR configuration, deleting {}", self.object_name);
            self.client.delete(&self.object_name).await?;
            self.metrics.frr_writes_total.with_label_values(&["delete"]).inc();
            return Ok(());
        };

        let live = self.client.get(&self.object_name).await?;
        if live.as_ref().is_some_and(|object| object.spec == desired) {
            debug!("FRRConfiguration {} already up to date", self.object_name);
            return Ok(());
        }

        info!("Writing FRRConfiguration {}", self.object_name);
        self.client
            .create_or_update(&self.object_name, &self.labels, &desired)
            .await?;
        let operation = if live.is_some() { "update" } else { "create" };
        self.metrics.frr_writes_total.with_label_values(&[operation]).inc();
        Ok(())
    }
}

/// Name of the FRRConfiguration object owned by `node`.
fn object_name(node: &str) -> String {
    format!("lb-{node}")
}

#[async_trait]
impl Reconcile for FrrPusher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn queue_key(&self, _trigger: ReconcileTrigger) -> ReconcileTrigger {
        ReconcileTrigger::Reload
    }

    async fn reconcile(&self, _trigger: &ReconcileTrigger) -> Result<(), ControllerError> {
        match self.push().await {
            Ok(()) => {
                self.reporter.report(SyncState::Success).await?;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to push FRRConfiguration {}: {}", self.object_name, e);
                self.reporter.report(SyncState::Error).await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frr::debounce;
    use crate::runner::run_reconciler;
    use crate::test_utils::{STATUS_OBJECT, metrics, reporter};
    use crate::trigger::trigger_channel;
    use crds::{BgpConfig, LabelSelector, Router};
    use lb_client::{MockFrrClient, MockStatusStore};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn spec(asn: u32) -> FRRConfigurationSpec {
        FRRConfigurationSpec {
            bgp: BgpConfig {
                routers: vec![Router {
                    asn,
                    ..Default::default()
                }],
                bfd_profiles: vec![],
            },
            node_selector: LabelSelector::with_label("kubernetes.io/hostname", "node1"),
        }
    }

    fn pusher(client: &MockFrrClient, store: &MockStatusStore) -> (Arc<FrrPusher>, mpsc::UnboundedReceiver<()>) {
        FrrPusher::new(
            "node1",
            Arc::new(client.clone()),
            reporter(store, "speaker-node1", FrrPusher::NAME),
            metrics(),
        )
    }

    #[tokio::test]
    async fn test_update_config_signals_change() {
        let (p, mut signals) = pusher(&MockFrrClient::new(), &MockStatusStore::new());
        p.update_config(Some(spec(64512)));
        assert!(signals.try_recv().is_ok());
        assert_eq!(p.desired(), Some(spec(64512)));
    }

    #[tokio::test]
    async fn test_push_creates_then_skips_equal_spec() {
        let client = MockFrrClient::new();
        let store = MockStatusStore::new();
        let (p, _signals) = pusher(&client, &store);

        p.update_config(Some(spec(64512)));
        p.reconcile(&ReconcileTrigger::Reload).await.expect("create");
        p.reconcile(&ReconcileTrigger::Reload).await.expect("no-op");

        assert_eq!(client.names(), vec!["lb-node1".to_string()]);
        assert_eq!(client.writes(), 1);
        assert_eq!(client.generation("lb-node1"), Some(1));
        let cond = store
            .condition(STATUS_OBJECT, "speaker-node1/frrk8sReconcilerValid")
            .expect("condition");
        assert!(cond.is_true());
    }

    #[tokio::test]
    async fn test_push_updates_changed_spec() {
        let client = MockFrrClient::new();
        let (p, _signals) = pusher(&client, &MockStatusStore::new());

        p.update_config(Some(spec(64512)));
        p.reconcile(&ReconcileTrigger::Reload).await.expect("create");
        p.update_config(Some(spec(64600)));
        p.reconcile(&ReconcileTrigger::Reload).await.expect("update");

        assert_eq!(client.generation("lb-node1"), Some(2));
        assert_eq!(client.spec("lb-node1"), Some(spec(64600)));
    }

    #[tokio::test]
    async fn test_none_deletes_object() {
        let client = MockFrrClient::new();
        let (p, _signals) = pusher(&client, &MockStatusStore::new());

        p.update_config(Some(spec(64512)));
        p.reconcile(&ReconcileTrigger::Reload).await.expect("create");
        p.update_config(None);
        p.reconcile(&ReconcileTrigger::Reload).await.expect("delete");
        p.reconcile(&ReconcileTrigger::Reload).await.expect("delete of a missing object");

        assert!(client.names().is_empty());
        assert_eq!(client.deletes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_updates_apply_once_with_last_spec() {
        const INTERVAL: Duration = Duration::from_secs(3);
        let client = MockFrrClient::new();
        let (p, signals) = pusher(&client, &MockStatusStore::new());
        let (reloads, triggers) = trigger_channel();
        let cancel = CancellationToken::new();
        let debouncer = tokio::spawn(debounce(signals, reloads, INTERVAL, cancel.clone()));
        let runner = tokio::spawn(run_reconciler(Arc::clone(&p), triggers, 1, metrics(), cancel.clone()));

        for asn in 64512..64517 {
            p.update_config(Some(spec(asn)));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(client.writes(), 0, "nothing is applied inside the interval");

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(client.writes(), 1);
        assert_eq!(client.spec("lb-node1"), Some(spec(64516)));
        assert_eq!(client.generation("lb-node1"), Some(1));

        cancel.cancel();
        debouncer.await.expect("debouncer exits");
        runner.await.expect("runner exits");
    }

    #[tokio::test]
    async fn test_write_failure_reports_and_retries() {
        let client = MockFrrClient::new();
        let store = MockStatusStore::new();
        let (p, _signals) = pusher(&client, &store);
        client.fail_next(1);

        p.update_config(Some(spec(64512)));
        assert!(p.reconcile(&ReconcileTrigger::Reload).await.is_err());
        let cond = store
            .condition(STATUS_OBJECT, "speaker-node1/frrk8sReconcilerValid")
            .expect("condition");
        assert_eq!(cond.reason, "SyncStateError");

        p.reconcile(&ReconcileTrigger::Reload).await.expect("retry");
        assert_eq!(client.spec("lb-node1"), Some(spec(64512)));
    }
}
