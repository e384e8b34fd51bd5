//! Service reconciler.
//!
//! Passes single service changes to the service handler and, on `Reload`,
//! replays every service. Each pass ends with a `StatusUpdate` for the
//! status reconcilers that derive counters from services.

use crate::error::ControllerError;
use crate::handler::{ServiceHandler, SyncState};
use crate::runner::Reconcile;
use crate::trigger::{ObjectKey, ReconcileTrigger, TriggerFanout};
use async_trait::async_trait;
use lb_client::ResourceReader;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ServiceReconciler {
    reader: Arc<dyn ResourceReader>,
    handler: Arc<dyn ServiceHandler>,
    status_updates: TriggerFanout,
}

impl ServiceReconciler {
    pub const NAME: &'static str = "serviceReconciler";

    pub fn new(reader: Arc<dyn ResourceReader>, handler: Arc<dyn ServiceHandler>, status_updates: TriggerFanout) -> Self {
        Self {
            reader,
            handler,
            status_updates,
        }
    }

    async fn replay_all(&self) -> Result<SyncState, ControllerError> {
        let services = self.reader.list_services().await?;
        debug!("Replaying {} services", services.len());
        let mut worst = SyncState::Success;
        for service in &services {
            let key = ObjectKey::from_resource(service);
            match self.handler.handle_service(&key, Some(service)) {
                SyncState::Error => worst = SyncState::Error,
                SyncState::ErrorNoRetry => warn!("Service {} failed permanently", key),
                _ => {}
            }
        }
        Ok(worst)
    }

    async fn handle_one(&self, key: &ObjectKey) -> Result<SyncState, ControllerError> {
        let service = match &key.namespace {
            Some(ns) => self.reader.get_service(ns, &key.name).await?,
            None => None,
        };
        Ok(self.handler.handle_service(key, service.as_ref()))
    }
}

#[async_trait]
impl Reconcile for ServiceReconciler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn reconcile(&self, trigger: &ReconcileTrigger) -> Result<(), ControllerError> {
        let state = match trigger {
            ReconcileTrigger::Reload => self.replay_all().await?,
            ReconcileTrigger::ResourceChange(key) => self.handle_one(key).await?,
            ReconcileTrigger::StatusUpdate => return Ok(()),
        };
        self.status_updates.fire(&ReconcileTrigger::StatusUpdate);

        if state == SyncState::Error {
            return Err(ControllerError::HandlerRetry(format!("service handler failed for {trigger}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lb_service;
    use crate::trigger::{TriggerReceiver, trigger_channel};
    use k8s_openapi::api::core::v1::Service;
    use lb_client::MockReader;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        failing: Mutex<Option<String>>,
        seen: Mutex<Vec<(ObjectKey, bool)>>,
    }

    impl ServiceHandler for Recording {
        fn handle_service(&self, key: &ObjectKey, service: Option<&Service>) -> SyncState {
            self.seen.lock().expect("lock").push((key.clone(), service.is_some()));
            if self.failing.lock().expect("lock").as_deref() == Some(key.name.as_str()) {
                SyncState::Error
            } else {
                SyncState::Success
            }
        }
    }

    struct Fixture {
        reader: MockReader,
        handler: Arc<Recording>,
        status: TriggerReceiver,
        reconciler: ServiceReconciler,
    }

    fn fixture() -> Fixture {
        let reader = MockReader::new();
        reader.set_services(vec![
            lb_service("default", "web", &["10.0.0.1"]),
            lb_service("apps", "api", &["10.0.0.2"]),
        ]);
        let handler = Arc::new(Recording::default());
        let (tx, status) = trigger_channel();
        let reconciler = ServiceReconciler::new(
            Arc::new(reader.clone()),
            Arc::clone(&handler) as _,
            TriggerFanout::new().with_target("status", tx),
        );
        Fixture {
            reader,
            handler,
            status,
            reconciler,
        }
    }

    #[tokio::test]
    async fn test_reload_replays_every_service() {
        let mut f = fixture();
        f.reconciler.reconcile(&ReconcileTrigger::Reload).await.expect("reconcile");

        let seen = f.handler.seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            vec![(ObjectKey::new("default", "web"), true), (ObjectKey::new("apps", "api"), true)]
        );
        assert_eq!(f.status.try_recv().ok(), Some(ReconcileTrigger::StatusUpdate));
    }

    #[tokio::test]
    async fn test_deleted_service_is_passed_as_absent() {
        let f = fixture();
        f.reader.set_services(Vec::new());
        let key = ObjectKey::new("default", "web");

        f.reconciler
            .reconcile(&ReconcileTrigger::ResourceChange(key.clone()))
            .await
            .expect("reconcile");

        assert_eq!(*f.handler.seen.lock().expect("lock"), vec![(key, false)]);
    }

    #[tokio::test]
    async fn test_handler_error_is_retried_after_status_update() {
        let mut f = fixture();
        *f.handler.failing.lock().expect("lock") = Some("api".to_string());

        let err = f
            .reconciler
            .reconcile(&ReconcileTrigger::Reload)
            .await
            .expect_err("retry requested");
        assert!(matches!(err, ControllerError::HandlerRetry(_)));
        assert_eq!(f.status.try_recv().ok(), Some(ReconcileTrigger::StatusUpdate));
    }

    #[tokio::test]
    async fn test_status_update_is_a_no_op() {
        let mut f = fixture();
        f.reconciler.reconcile(&ReconcileTrigger::StatusUpdate).await.expect("reconcile");
        assert!(f.handler.seen.lock().expect("lock").is_empty());
        assert!(f.status.try_recv().is_err());
    }
}
