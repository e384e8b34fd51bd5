//! Writes allocator usage counters into `IPAddressPool.status`.

use crate::error::ControllerError;
use crate::handler::PoolCountersFetcher;
use crate::runner::Reconcile;
use crate::trigger::ReconcileTrigger;
use async_trait::async_trait;
use kube::ResourceExt;
use lb_client::{PoolStatusWriter, ResourceReader};
use std::sync::Arc;
use tracing::debug;

pub struct PoolStatusReconciler {
    reader: Arc<dyn ResourceReader>,
    counters: Arc<dyn PoolCountersFetcher>,
    writer: Arc<dyn PoolStatusWriter>,
}

impl PoolStatusReconciler {
    pub const NAME: &'static str = "poolStatusReconciler";

    pub fn new(
        reader: Arc<dyn ResourceReader>,
        counters: Arc<dyn PoolCountersFetcher>,
        writer: Arc<dyn PoolStatusWriter>,
    ) -> Self {
        Self {
            reader,
            counters,
            writer,
        }
    }
}

#[async_trait]
impl Reconcile for PoolStatusReconciler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn queue_key(&self, _trigger: ReconcileTrigger) -> ReconcileTrigger {
        ReconcileTrigger::StatusUpdate
    }

    async fn reconcile(&self, _trigger: &ReconcileTrigger) -> Result<(), ControllerError> {
        for pool in self.reader.list_pools().await? {
            let name = pool.name_any();
            let Some(counters) = self.counters.pool_counters(&name) else {
                continue;
            };
            if pool.status.as_ref() == Some(&counters) {
                continue;
            }
            debug!("Updating usage of pool {}: {:?}", name, counters);
            self.writer.patch_pool_status(&name, &counters).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ConfigHandler, ServiceHandler};
    use crate::handlers::AddressBook;
    use crate::test_utils::lb_service;
    use crate::trigger::ObjectKey;
    use crds::IPAddressPoolStatus;
    use lb_client::{MockPoolStatusWriter, MockReader};
    use lb_config::test_fixtures::pool;
    use lb_config::{ClusterResources, Validation, build_config};
    use pretty_assertions::assert_eq;

    fn fixture() -> (MockReader, Arc<AddressBook>, MockPoolStatusWriter, PoolStatusReconciler) {
        let resources = ClusterResources {
            pools: vec![pool("pool-a", &["10.0.0.0/30"]), pool("pool-b", &["10.0.1.0/30"])],
            ..Default::default()
        };
        let book = Arc::new(AddressBook::new());
        book.handle(&build_config(&resources.clone().canonicalize(), Validation::DontValidate).expect("valid config"));
        let web = lb_service("default", "web", &["10.0.0.1"]);
        book.handle_service(&ObjectKey::from_resource(&web), Some(&web));

        let reader = MockReader::with_resources(resources);
        let writer = MockPoolStatusWriter::new();
        let reconciler = PoolStatusReconciler::new(
            Arc::new(reader.clone()),
            Arc::clone(&book) as _,
            Arc::new(writer.clone()),
        );
        (reader, book, writer, reconciler)
    }

    #[tokio::test]
    async fn test_counters_are_written_per_pool() {
        let (_, _, writer, r) = fixture();
        r.reconcile(&ReconcileTrigger::StatusUpdate).await.expect("reconcile");

        assert_eq!(
            writer.status("pool-a"),
            Some(IPAddressPoolStatus {
                assigned_ipv4: 1,
                assigned_ipv6: 0,
                available_ipv4: 3,
                available_ipv6: 0,
            })
        );
        assert_eq!(writer.status("pool-b").map(|s| s.available_ipv4), Some(4));
        assert_eq!(writer.writes(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let (reader, book, writer, r) = fixture();
        reader.update(|resources| {
            for p in &mut resources.pools {
                p.status = book.pool_counters(&p.name_any());
            }
        });

        r.reconcile(&ReconcileTrigger::StatusUpdate).await.expect("reconcile");
        assert_eq!(writer.writes(), 0);
    }

    #[tokio::test]
    async fn test_pool_unknown_to_allocator_is_skipped() {
        let (reader, _, writer, r) = fixture();
        reader.update(|resources| resources.pools.push(pool("pool-new", &["10.0.2.0/30"])));

        r.reconcile(&ReconcileTrigger::StatusUpdate).await.expect("reconcile");
        assert_eq!(writer.status("pool-new"), None);
        assert_eq!(writer.writes(), 2);
    }
}
