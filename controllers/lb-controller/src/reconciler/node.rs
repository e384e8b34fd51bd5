//! Node reconciler: hands the speaker's own Node to the node handler.
//!
//! A `ReprocessAll` answer reloads the dependents wired into `force_reload`.

use crate::error::ControllerError;
use crate::handler::{NodeHandler, SyncState};
use crate::runner::Reconcile;
use crate::status::ConditionReporter;
use crate::trigger::{ReconcileTrigger, TriggerFanout};
use async_trait::async_trait;
use lb_client::ResourceReader;
use std::sync::Arc;
use tracing::{debug, info};

pub struct NodeReconciler {
    node_name: String,
    reader: Arc<dyn ResourceReader>,
    handler: Arc<dyn NodeHandler>,
    reporter: ConditionReporter,
    force_reload: TriggerFanout,
}

impl NodeReconciler {
    pub const NAME: &'static str = "nodeReconciler";

    pub fn new(
        node_name: impl Into<String>,
        reader: Arc<dyn ResourceReader>,
        handler: Arc<dyn NodeHandler>,
        reporter: ConditionReporter,
        force_reload: TriggerFanout,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            reader,
            handler,
            reporter,
            force_reload,
        }
    }
}

#[async_trait]
impl Reconcile for NodeReconciler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn queue_key(&self, _trigger: ReconcileTrigger) -> ReconcileTrigger {
        ReconcileTrigger::Reload
    }

    async fn reconcile(&self, _trigger: &ReconcileTrigger) -> Result<(), ControllerError> {
        let Some(node) = self.reader.get_node(&self.node_name).await? else {
            debug!("Node {} not found, nothing to reconcile", self.node_name);
            return Ok(());
        };

        let state = self.handler.handle_node(&node);
        if state == SyncState::ReprocessAll {
            info!("Node {} changed, reprocessing dependents", self.node_name);
            self.force_reload.fire(&ReconcileTrigger::Reload);
        }
        self.reporter.report(state).await?;
        if state == SyncState::Error {
            return Err(ControllerError::HandlerRetry(format!(
                "node handler failed for {}",
                self.node_name
            )));
        }
        Ok(())
    }
}
