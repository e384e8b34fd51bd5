//! Create/update/delete of per-node FRRConfiguration objects.

use crate::error::ClientError;
use async_trait::async_trait;
use crds::{FRRConfiguration, FRRConfigurationSpec};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[async_trait]
pub trait FrrConfigClient: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<FRRConfiguration>, ClientError>;

    /// Creates the object, or replaces the spec of an existing one.
    async fn create_or_update(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        spec: &FRRConfigurationSpec,
    ) -> Result<(), ClientError>;

    /// Deletes the object; deleting a missing object succeeds.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;
}

/// [`FrrConfigClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeFrrClient {
    api: Api<FRRConfiguration>,
    namespace: String,
}

impl KubeFrrClient {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
        }
    }
}

#[async_trait]
impl FrrConfigClient for KubeFrrClient {
    async fn get(&self, name: &str) -> Result<Option<FRRConfiguration>, ClientError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create_or_update(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        spec: &FRRConfigurationSpec,
    ) -> Result<(), ClientError> {
        if self.api.get_opt(name).await?.is_none() {
            let mut object = FRRConfiguration::new(name, spec.clone());
            object.metadata.namespace = Some(self.namespace.clone());
            object.metadata.labels = Some(labels.clone());
            self.api.create(&PostParams::default(), &object).await?;
            info!("Created FRRConfiguration {}/{}", self.namespace, name);
            return Ok(());
        }

        // Merge patching the spec replaces every list it carries.
        let patch = json!({
            "metadata": { "labels": labels },
            "spec": spec,
        });
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Updated FRRConfiguration {}/{}", self.namespace, name);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted FRRConfiguration {}/{}", self.namespace, name);
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
