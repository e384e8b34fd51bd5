//! Shared fixtures for unit tests.

use crate::metrics::ControllerMetrics;
use crate::status::ConditionReporter;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus};
use kube::api::ObjectMeta;
use lb_client::MockStatusStore;
use std::sync::Arc;

pub const STATUS_OBJECT: &str = "config-status";

/// A LoadBalancer service publishing `ips` as ingress.
pub fn lb_service(namespace: &str, name: &str, ips: &[&str]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        status: Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(
                    ips.iter()
                        .map(|ip| LoadBalancerIngress {
                            ip: Some((*ip).to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn reporter(store: &MockStatusStore, owner: &str, reconciler: &str) -> ConditionReporter {
    ConditionReporter::new(Arc::new(store.clone()), STATUS_OBJECT, owner, reconciler)
}

pub fn metrics() -> Arc<ControllerMetrics> {
    Arc::new(ControllerMetrics::new().expect("metrics registry"))
}
