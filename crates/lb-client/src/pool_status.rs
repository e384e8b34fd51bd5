//! Status writes for IPAddressPool objects.

use crate::error::ClientError;
use async_trait::async_trait;
use crds::{IPAddressPool, IPAddressPoolStatus};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;

#[async_trait]
pub trait PoolStatusWriter: Send + Sync {
    async fn patch_pool_status(&self, name: &str, status: &IPAddressPoolStatus) -> Result<(), ClientError>;
}

/// [`PoolStatusWriter`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePoolStatusWriter {
    api: Api<IPAddressPool>,
}

impl KubePoolStatusWriter {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl PoolStatusWriter for KubePoolStatusWriter {
    async fn patch_pool_status(&self, name: &str, status: &IPAddressPoolStatus) -> Result<(), ClientError> {
        let patch = json!({ "status": status });
        self.api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
