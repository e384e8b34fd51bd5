//! Aggregate status reconciler for the `ConfigurationState` object.
//!
//! Reads every component condition on the object, derives `Ready` plus
//! the result and error summary, and writes them back when they differ.
//! `Ready` and the summary fields are applied under separate field
//! managers so neither write releases ownership of the other.

use crate::error::ControllerError;
use crate::status::conditions::now;
use crate::status::{CONDITION_TYPE_READY, compute_ready, find_condition, set_condition};
use crds::{ConfigurationResult, ConfigurationState};
use kube_runtime::controller::Action;
use lb_client::ConditionWriter;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

const FIELD_MANAGER: &str = "controller/configurationStateReconciler";
const SUMMARY_FIELD_MANAGER: &str = "controller/configurationStateSummary";

pub struct ConfigurationStateReconciler {
    writer: Arc<dyn ConditionWriter>,
    name: String,
}

impl ConfigurationStateReconciler {
    pub fn new(writer: Arc<dyn ConditionWriter>, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
        }
    }

    pub fn object_name(&self) -> &str {
        &self.name
    }

    /// One aggregation pass. Returns whether anything was written.
    pub async fn reconcile_once(&self) -> Result<bool, ControllerError> {
        self.writer.ensure_exists(&self.name).await?;
        let status = self
            .writer
            .get(&self.name)
            .await?
            .and_then(|state| state.status)
            .unwrap_or_default();

        let aggregate = compute_ready(&status.conditions);

        let mut ready: Vec<_> = find_condition(&status.conditions, CONDITION_TYPE_READY)
            .cloned()
            .into_iter()
            .collect();
        let ready_changed = set_condition(&mut ready, aggregate.ready, &now());
        let summary_changed = status.result != Some(aggregate.result)
            || status.error_summary.as_deref().unwrap_or_default() != aggregate.error_summary;

        if !ready_changed && !summary_changed {
            debug!("ConfigurationState {} already up to date", self.name);
            return Ok(false);
        }

        if ready_changed {
            self.writer
                .apply_conditions(&self.name, FIELD_MANAGER, ready)
                .await?;
        }
        if summary_changed {
            if aggregate.result == ConfigurationResult::Invalid {
                info!(
                    "ConfigurationState {} is invalid: {}",
                    self.name, aggregate.error_summary
                );
            }
            self.writer
                .apply_summary(
                    &self.name,
                    SUMMARY_FIELD_MANAGER,
                    aggregate.result,
                    aggregate.error_summary,
                )
                .await?;
        }
        Ok(true)
    }
}

/// Reconcile entry point for `watch_resource` over `ConfigurationState`.
pub fn reconcile_state(
    ctx: Arc<ConfigurationStateReconciler>,
    _state: Arc<ConfigurationState>,
) -> Pin<Box<dyn Future<Output = Result<Action, ControllerError>> + Send>> {
    Box::pin(async move {
        ctx.reconcile_once().await?;
        Ok(Action::await_change())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{CONDITION_FALSE, CONDITION_TRUE, CONDITION_UNKNOWN, Condition};
    use lb_client::MockStatusStore;

    const OBJECT: &str = "config-status";

    async fn seed(store: &MockStatusStore, manager: &str, condition: Condition) {
        store.ensure_exists(OBJECT).await.expect("ensure");
        store
            .apply_conditions(OBJECT, manager, vec![condition])
            .await
            .expect("apply");
    }

    #[tokio::test]
    async fn test_empty_object_is_unknown() {
        let store = MockStatusStore::new();
        let r = ConfigurationStateReconciler::new(Arc::new(store.clone()), OBJECT);

        assert!(r.reconcile_once().await.expect("reconcile"));

        let ready = store.condition(OBJECT, CONDITION_TYPE_READY).expect("ready");
        assert_eq!(ready.status, CONDITION_UNKNOWN);
        assert_eq!(ready.reason, "WaitingForConditions");
        let status = store.status(OBJECT).expect("status");
        assert_eq!(status.result, Some(ConfigurationResult::Unknown));
    }

    #[tokio::test]
    async fn test_failing_component_sets_summary() {
        let store = MockStatusStore::new();
        seed(
            &store,
            "controller/configReconciler",
            Condition::new(
                "controller/configReconcilerValid",
                CONDITION_FALSE,
                "ConfigError",
                "peer p1 has no address",
            ),
        )
        .await;
        seed(
            &store,
            "speaker-n1/nodeReconciler",
            Condition::new("speaker-n1/nodeReconcilerValid", CONDITION_TRUE, "SyncStateSuccess", ""),
        )
        .await;
        let r = ConfigurationStateReconciler::new(Arc::new(store.clone()), OBJECT);

        r.reconcile_once().await.expect("reconcile");

        let ready = store.condition(OBJECT, CONDITION_TYPE_READY).expect("ready");
        assert_eq!(ready.status, CONDITION_FALSE);
        assert_eq!(ready.message, "Failed components: [controller/configReconcilerValid]");
        let status = store.status(OBJECT).expect("status");
        assert_eq!(status.result, Some(ConfigurationResult::Invalid));
        assert_eq!(status.error_summary.as_deref(), Some("peer p1 has no address"));
        // component conditions survive the aggregate write
        assert!(store.condition(OBJECT, "speaker-n1/nodeReconcilerValid").is_some());
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let store = MockStatusStore::new();
        seed(
            &store,
            "controller/configReconciler",
            Condition::new("controller/configReconcilerValid", CONDITION_TRUE, "SyncStateSuccess", ""),
        )
        .await;
        let r = ConfigurationStateReconciler::new(Arc::new(store.clone()), OBJECT);

        assert!(r.reconcile_once().await.expect("first"));
        let writes = store.writes();
        assert!(!r.reconcile_once().await.expect("second"));
        assert_eq!(store.writes(), writes);
        assert_eq!(
            store.status(OBJECT).and_then(|s| s.result),
            Some(ConfigurationResult::Valid)
        );
    }

    #[tokio::test]
    async fn test_recovery_flips_ready_and_clears_summary() {
        let store = MockStatusStore::new();
        let manager = "controller/configReconciler";
        seed(
            &store,
            manager,
            Condition::new("controller/configReconcilerValid", CONDITION_FALSE, "ConfigError", "bad"),
        )
        .await;
        let r = ConfigurationStateReconciler::new(Arc::new(store.clone()), OBJECT);
        r.reconcile_once().await.expect("reconcile");

        seed(
            &store,
            manager,
            Condition::new("controller/configReconcilerValid", CONDITION_TRUE, "SyncStateSuccess", ""),
        )
        .await;
        r.reconcile_once().await.expect("reconcile");

        let ready = store.condition(OBJECT, CONDITION_TYPE_READY).expect("ready");
        assert!(ready.is_true());
        let status = store.status(OBJECT).expect("status");
        assert_eq!(status.error_summary.as_deref(), Some(""));
        assert_eq!(status.result, Some(ConfigurationResult::Valid));
    }
}
