//! Process wiring.
//!
//! Builds the reconcilers, watches and servers of one component and runs
//! them as tasks sharing a single cancellation token.

use crate::error::ControllerError;
use crate::frr::{FrrPusher, debounce};
use crate::handlers::{AddressBook, SpeakerState};
use crate::metrics::ControllerMetrics;
use crate::reconciler::{
    ConfigReconciler, ConfigurationStateReconciler, NodeReconciler, PoolStatusReconciler,
    ServiceReconciler, reconcile_state,
};
use crate::runner::{Reconcile, run_reconciler};
use crate::settings::{BgpType, Component, Settings};
use crate::status::ConditionReporter;
use crate::trigger::{ReconcileTrigger, TriggerFanout, TriggerSender, trigger_channel};
use crate::watcher::{
    EventFilter, Fingerprint, bgp_extras_fingerprint, crd_fingerprint, namespace_fingerprint,
    node_fingerprint, resource_version_fingerprint, secret_fingerprint, watch_into, watch_resource,
};
use crate::webhook::{Validators, WebhookState, serve};
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, ConfigurationState,
    IPAddressPool, L2Advertisement,
};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Secret, Service};
use kube::{Api, Client, Resource};
use kube_runtime::watcher;
use lb_client::{
    ConditionWriter, Domain, KubeConditionWriter, KubeFrrClient, KubePoolStatusWriter, KubeReader,
    ResourceReader,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type TaskResult = (&'static str, Result<(), ControllerError>);

/// Shared handles every component needs.
struct Wiring {
    client: Client,
    settings: Settings,
    reader: Arc<dyn ResourceReader>,
    status: Arc<dyn ConditionWriter>,
    metrics: Arc<ControllerMetrics>,
    cancel: CancellationToken,
    tasks: JoinSet<TaskResult>,
}

impl Wiring {
    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), ControllerError>> + Send + 'static,
    {
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Starts a reconciler and returns the sender feeding it. An initial
    /// `Reload` is queued so the reconciler reports even on an empty cluster.
    fn start<R: Reconcile>(&mut self, reconciler: Arc<R>) -> TriggerSender {
        let (tx, rx) = trigger_channel();
        let _ = tx.try_send(ReconcileTrigger::Reload);
        let name = reconciler.name();
        let workers = self.settings.reconcile_workers;
        let metrics = Arc::clone(&self.metrics);
        let cancel = self.cancel.clone();
        self.spawn(name, async move {
            run_reconciler(reconciler, rx, workers, metrics, cancel).await;
            Ok(())
        });
        tx
    }

    fn watch<K>(&mut self, name: &'static str, api: Api<K>, config: watcher::Config, fingerprint: Fingerprint<K>, sink: TriggerFanout)
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let cancel = self.cancel.clone();
        self.spawn(name, watch_into(api, config, EventFilter::new(fingerprint), sink, cancel));
    }

    fn namespaced<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.settings.namespace)
    }

    fn reporter(&self, reconciler: &str) -> ConditionReporter {
        let reporter = ConditionReporter::new(
            Arc::clone(&self.status),
            self.settings.config_status_name.clone(),
            &self.settings.component.owner(),
            reconciler,
        );
        debug!("{} reports condition {}", reconciler, reporter.condition_type());
        reporter
    }

    /// Watches every load-balancer CRD of the pool domain into `sink`.
    fn watch_pool_domain(&mut self, sink: &TriggerFanout) {
        let all = watcher::Config::default;
        self.watch("IPAddressPool", self.namespaced::<IPAddressPool>(), all(), crd_fingerprint, sink.clone());
        self.watch("AddressPool", self.namespaced::<AddressPool>(), all(), crd_fingerprint, sink.clone());
        self.watch("Community", self.namespaced::<Community>(), all(), crd_fingerprint, sink.clone());
        self.watch(
            "Namespace",
            Api::<Namespace>::all(self.client.clone()),
            all(),
            namespace_fingerprint,
            sink.clone(),
        );
    }
}

/// One running component.
pub struct Controller {
    tasks: JoinSet<TaskResult>,
    cancel: CancellationToken,
}

impl Controller {
    pub async fn new(settings: Settings, cancel: CancellationToken) -> Result<Self, ControllerError> {
        let client = Client::try_default().await?;
        let metrics = Arc::new(
            ControllerMetrics::new().map_err(|e| ControllerError::InvalidConfig(format!("metrics registry: {e}")))?,
        );
        let mut wiring = Wiring {
            reader: Arc::new(KubeReader::new(client.clone(), settings.namespace.clone())),
            status: Arc::new(KubeConditionWriter::new(client.clone(), settings.namespace.clone())),
            client,
            settings,
            metrics,
            cancel: cancel.clone(),
            tasks: JoinSet::new(),
        };

        match wiring.settings.component.clone() {
            Component::Controller => start_controller(&mut wiring).await?,
            Component::Speaker { node_name } => start_speaker(&mut wiring, &node_name),
        }

        Ok(Self {
            tasks: wiring.tasks,
            cancel,
        })
    }

    /// Runs until cancelled or until any task stops on its own.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Controller running with {} tasks", self.tasks.len());
        let mut outcome = Ok(());

        if let Some(joined) = self.tasks.join_next().await {
            if !self.cancel.is_cancelled() {
                outcome = match joined {
                    Ok((name, Ok(()))) => Err(ControllerError::Watch(format!("{name} stopped unexpectedly"))),
                    Ok((name, Err(e))) => {
                        error!("{} failed: {}", name, e);
                        Err(e)
                    }
                    Err(e) => Err(ControllerError::Watch(format!("task panicked: {e}"))),
                };
            }
        }

        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, Err(e))) => warn!("{} stopped with error during shutdown: {}", name, e),
                Err(e) if !e.is_cancelled() => warn!("Task panicked during shutdown: {}", e),
                _ => {}
            }
        }
        info!("All tasks stopped");
        outcome
    }
}

async fn start_controller(wiring: &mut Wiring) -> Result<(), ControllerError> {
    let settings = wiring.settings.clone();
    let validation = settings.bgp_type.validation();
    let book = Arc::new(AddressBook::new());

    let pool_status = wiring.start(Arc::new(PoolStatusReconciler::new(
        Arc::clone(&wiring.reader),
        Arc::clone(&book) as _,
        Arc::new(KubePoolStatusWriter::new(wiring.client.clone(), &settings.namespace)),
    )));
    let status_fanout = TriggerFanout::new().with_target(PoolStatusReconciler::NAME, pool_status.clone());

    let services = wiring.start(Arc::new(ServiceReconciler::new(
        Arc::clone(&wiring.reader),
        Arc::clone(&book) as _,
        status_fanout,
    )));
    let service_fanout = TriggerFanout::new().with_target(ServiceReconciler::NAME, services);

    let pools = wiring.start(Arc::new(ConfigReconciler::new(
        Domain::Pools,
        validation,
        Arc::clone(&wiring.reader),
        book,
        wiring.reporter(ConfigReconciler::POOLS),
        service_fanout.clone(),
    )));
    let pool_fanout = TriggerFanout::new()
        .with_target(ConfigReconciler::POOLS, pools)
        .with_target(PoolStatusReconciler::NAME, pool_status);

    wiring.watch_pool_domain(&pool_fanout);
    wiring.watch(
        "Service",
        Api::<Service>::all(wiring.client.clone()),
        watcher::Config::default(),
        resource_version_fingerprint,
        service_fanout,
    );

    let aggregate = Arc::new(ConfigurationStateReconciler::new(
        Arc::clone(&wiring.status),
        settings.config_status_name.clone(),
    ));
    if let Err(e) = aggregate.reconcile_once().await {
        warn!("Initial aggregation of {} failed: {}", aggregate.object_name(), e);
    }
    let selector = format!("metadata.name={}", aggregate.object_name());
    let cancel = wiring.cancel.clone();
    let api = wiring.namespaced::<ConfigurationState>();
    wiring.spawn(
        "configurationStateReconciler",
        watch_resource(
            api,
            watcher::Config::default().fields(&selector),
            aggregate,
            reconcile_state,
            "ConfigurationState",
            cancel,
        ),
    );

    if settings.enable_webhook {
        let (port, cert_dir) = (settings.webhook_port, settings.webhook_cert_dir.clone());
        let state = Arc::new(WebhookState {
            validators: Validators::new(Arc::clone(&wiring.reader), settings.namespace.clone(), validation),
            metrics: Arc::clone(&wiring.metrics),
        });
        let cancel = wiring.cancel.clone();
        wiring.spawn("webhook", async move {
            serve(state, port, cert_dir.as_deref(), cancel).await
        });
    } else {
        info!("Admission webhook disabled");
    }
    Ok(())
}

fn start_speaker(wiring: &mut Wiring, node_name: &str) {
    let settings = wiring.settings.clone();

    let pusher = (settings.bgp_type == BgpType::FrrK8s).then(|| {
        let (pusher, signals) = FrrPusher::new(
            node_name,
            Arc::new(KubeFrrClient::new(wiring.client.clone(), settings.frrk8s_namespace.clone())),
            wiring.reporter(FrrPusher::NAME),
            Arc::clone(&wiring.metrics),
        );
        info!("Pushing FRR configuration to {}/{}", settings.frrk8s_namespace, pusher.object_name());
        let reloads = wiring.start(Arc::clone(&pusher));
        let interval = settings.frr_debounce;
        let cancel = wiring.cancel.clone();
        wiring.spawn("frrDebouncer", async move {
            debounce(signals, reloads, interval, cancel).await;
            Ok(())
        });
        pusher
    });
    let speaker = Arc::new(SpeakerState::new(node_name, pusher));

    let services = wiring.start(Arc::new(ServiceReconciler::new(
        Arc::clone(&wiring.reader),
        Arc::clone(&speaker) as _,
        TriggerFanout::new(),
    )));
    let service_fanout = TriggerFanout::new().with_target(ServiceReconciler::NAME, services);

    let node = wiring.start(Arc::new(NodeReconciler::new(
        node_name,
        Arc::clone(&wiring.reader),
        Arc::clone(&speaker) as _,
        wiring.reporter(NodeReconciler::NAME),
        service_fanout.clone(),
    )));

    let config = wiring.start(Arc::new(ConfigReconciler::new(
        Domain::Full,
        settings.bgp_type.validation(),
        Arc::clone(&wiring.reader),
        speaker,
        wiring.reporter(ConfigReconciler::FULL),
        service_fanout.clone(),
    )));
    let config_fanout = TriggerFanout::new().with_target(ConfigReconciler::FULL, config);

    let all = watcher::Config::default;
    wiring.watch_pool_domain(&config_fanout);
    wiring.watch("BGPPeer", wiring.namespaced::<BGPPeer>(), all(), crd_fingerprint, config_fanout.clone());
    wiring.watch("BFDProfile", wiring.namespaced::<BFDProfile>(), all(), crd_fingerprint, config_fanout.clone());
    wiring.watch(
        "BGPAdvertisement",
        wiring.namespaced::<BGPAdvertisement>(),
        all(),
        crd_fingerprint,
        config_fanout.clone(),
    );
    wiring.watch(
        "L2Advertisement",
        wiring.namespaced::<L2Advertisement>(),
        all(),
        crd_fingerprint,
        config_fanout.clone(),
    );
    wiring.watch("Secret", wiring.namespaced::<Secret>(), all(), secret_fingerprint, config_fanout.clone());
    wiring.watch("ConfigMap", wiring.namespaced::<ConfigMap>(), all(), bgp_extras_fingerprint, config_fanout.clone());
    wiring.watch(
        "Node",
        Api::<Node>::all(wiring.client.clone()),
        all(),
        node_fingerprint,
        config_fanout.with_target(NodeReconciler::NAME, node),
    );
    wiring.watch(
        "Service",
        Api::<Service>::all(wiring.client.clone()),
        all(),
        resource_version_fingerprint,
        service_fanout,
    );
}
