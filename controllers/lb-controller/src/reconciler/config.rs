//! Config reconciler.
//!
//! Collects the resources of its domain, builds a [`Config`] and hands it to
//! the injected handler:
//!
//! - build failure: report `ConfigError`, no retry (needs a new write)
//! - `Success`: report success
//! - `ReprocessAll`: reload every dependent reconciler, report success
//! - `Error`: report `ConfigError`, forget the cached config and retry
//!   with backoff
//! - `ErrorNoRetry`: report `ConfigError`, no retry
//!
//! A config equal to the last successfully handled one skips the handler.

use crate::error::ControllerError;
use crate::handler::{ConfigHandler, SyncState};
use crate::runner::Reconcile;
use crate::status::ConditionReporter;
use crate::trigger::{ReconcileTrigger, TriggerFanout};
use async_trait::async_trait;
use lb_client::{Domain, ResourceReader, collect_resources};
use lb_config::{Config, Validation, build_config};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const HANDLER_RETRY_MESSAGE: &str = "handler failed to apply configuration, retrying";
const HANDLER_NO_RETRY_MESSAGE: &str = "handler returned SyncStateErrorNoRetry";

pub struct ConfigReconciler {
    name: &'static str,
    domain: Domain,
    validation: Validation,
    reader: Arc<dyn ResourceReader>,
    handler: Arc<dyn ConfigHandler>,
    reporter: ConditionReporter,
    force_reload: TriggerFanout,
    last_config: Mutex<Option<Config>>,
}

impl ConfigReconciler {
    /// Name of the reconciler over the full resource set (speaker side).
    pub const FULL: &'static str = "configReconciler";
    /// Name of the reconciler over pools only (controller side).
    pub const POOLS: &'static str = "poolReconciler";

    pub fn new(
        domain: Domain,
        validation: Validation,
        reader: Arc<dyn ResourceReader>,
        handler: Arc<dyn ConfigHandler>,
        reporter: ConditionReporter,
        force_reload: TriggerFanout,
    ) -> Self {
        let name = match domain {
            Domain::Full => Self::FULL,
            Domain::Pools => Self::POOLS,
        };
        Self {
            name,
            domain,
            validation,
            reader,
            handler,
            reporter,
            force_reload,
            last_config: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Reconcile for ConfigReconciler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn queue_key(&self, _trigger: ReconcileTrigger) -> ReconcileTrigger {
        ReconcileTrigger::Reload
    }

    async fn reconcile(&self, _trigger: &ReconcileTrigger) -> Result<(), ControllerError> {
        let resources = collect_resources(self.reader.as_ref(), self.domain).await?;

        let config = match build_config(&resources, self.validation) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}: configuration rejected: {}", self.name, e);
                debug!("{}: rejected resources: {:?}", self.name, resources);
                self.reporter.report_error(&e.to_string()).await?;
                return Ok(());
            }
        };

        let mut last = self.last_config.lock().await;
        if last.as_ref() == Some(&config) {
            debug!("{}: configuration unchanged", self.name);
            self.reporter.report(SyncState::Success).await?;
            return Ok(());
        }

        let state = self.handler.handle(&config);
        match state {
            SyncState::Success => {
                info!("{}: configuration applied", self.name);
                *last = Some(config);
            }
            SyncState::ReprocessAll => {
                info!("{}: configuration applied, reprocessing dependents", self.name);
                *last = Some(config);
                self.force_reload.fire(&ReconcileTrigger::Reload);
            }
            SyncState::Error => {
                *last = None;
                drop(last);
                self.reporter.report_error(HANDLER_RETRY_MESSAGE).await?;
                return Err(ControllerError::HandlerRetry(format!(
                    "{} handler failed to apply the configuration",
                    self.name
                )));
            }
            SyncState::ErrorNoRetry => {
                warn!("{}: handler failed permanently", self.name);
                *last = None;
                drop(last);
                self.reporter.report_error(HANDLER_NO_RETRY_MESSAGE).await?;
                return Ok(());
            }
        }
        drop(last);
        self.reporter.report(state).await?;
        Ok(())
    }
}
