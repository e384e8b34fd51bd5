//! Writes to the shared ConfigurationState object.
//!
//! Every reconciler owns its own condition entries through server-side
//! apply: each one applies with a distinct field manager, and the
//! `conditions` list is a map keyed by `type`, so concurrent writers never
//! clobber each other's entries.

use crate::error::ClientError;
use async_trait::async_trait;
use crds::{Condition, ConfigurationResult, ConfigurationState, ConfigurationStateSpec};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde_json::json;
use tracing::debug;

#[async_trait]
pub trait ConditionWriter: Send + Sync {
    /// Current state of the object, `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<ConfigurationState>, ClientError>;

    /// Creates an empty object when none exists yet.
    async fn ensure_exists(&self, name: &str) -> Result<(), ClientError>;

    /// Applies `conditions` as the complete set owned by `field_manager`.
    async fn apply_conditions(
        &self,
        name: &str,
        field_manager: &str,
        conditions: Vec<Condition>,
    ) -> Result<(), ClientError>;

    /// Applies the aggregate result fields.
    async fn apply_summary(
        &self,
        name: &str,
        field_manager: &str,
        result: ConfigurationResult,
        error_summary: String,
    ) -> Result<(), ClientError>;
}

/// [`ConditionWriter`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeConditionWriter {
    api: Api<ConfigurationState>,
    namespace: String,
}

impl KubeConditionWriter {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
        }
    }

    fn status_patch(status: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": ConfigurationState::api_version(&()),
            "kind": ConfigurationState::kind(&()),
            "status": status,
        })
    }

    async fn apply_status(&self, name: &str, field_manager: &str, status: serde_json::Value) -> Result<(), ClientError> {
        let pp = PatchParams::apply(field_manager).force();
        self.api
            .patch_status(name, &pp, &Patch::Apply(&Self::status_patch(status)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConditionWriter for KubeConditionWriter {
    async fn get(&self, name: &str) -> Result<Option<ConfigurationState>, ClientError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn ensure_exists(&self, name: &str) -> Result<(), ClientError> {
        if self.api.get_opt(name).await?.is_some() {
            return Ok(());
        }
        let mut object = ConfigurationState::new(name, ConfigurationStateSpec {});
        object.metadata.namespace = Some(self.namespace.clone());
        match self.api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                debug!("Created ConfigurationState {}/{}", self.namespace, name);
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_conditions(
        &self,
        name: &str,
        field_manager: &str,
        conditions: Vec<Condition>,
    ) -> Result<(), ClientError> {
        self.apply_status(name, field_manager, json!({ "conditions": conditions }))
            .await
    }

    async fn apply_summary(
        &self,
        name: &str,
        field_manager: &str,
        result: ConfigurationResult,
        error_summary: String,
    ) -> Result<(), ClientError> {
        self.apply_status(
            name,
            field_manager,
            json!({ "result": result, "errorSummary": error_summary }),
        )
        .await
    }
}
