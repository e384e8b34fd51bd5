//! Read access to the resources the config builder consumes.

use crate::error::ClientError;
use async_trait::async_trait;
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, IPAddressPool,
    L2Advertisement,
};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Secret, Service};
use kube::api::ListParams;
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Name of the ConfigMap carrying free-form per-peer BGP options.
pub const BGP_EXTRAS_CONFIGMAP: &str = "bgpextras";

/// Listing operations over the load-balancer namespace and the cluster.
///
/// Namespaced resources are read from the namespace the reader was created
/// for. All async methods must be `Send` to work with Tokio's work-stealing
/// runtime.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn list_pools(&self) -> Result<Vec<IPAddressPool>, ClientError>;
    async fn list_legacy_pools(&self) -> Result<Vec<AddressPool>, ClientError>;
    async fn list_peers(&self) -> Result<Vec<BGPPeer>, ClientError>;
    async fn list_bfd_profiles(&self) -> Result<Vec<BFDProfile>, ClientError>;
    async fn list_bgp_advertisements(&self) -> Result<Vec<BGPAdvertisement>, ClientError>;
    async fn list_l2_advertisements(&self) -> Result<Vec<L2Advertisement>, ClientError>;
    async fn list_communities(&self) -> Result<Vec<Community>, ClientError>;

    /// A secret of the load-balancer namespace, `None` when absent.
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, ClientError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, ClientError>;
    async fn get_node(&self, name: &str) -> Result<Option<Node>, ClientError>;
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError>;

    /// Contents of the `bgpextras` ConfigMap; empty when it does not exist.
    async fn get_bgp_extras(&self) -> Result<BTreeMap<String, String>, ClientError>;

    /// Services of every namespace.
    async fn list_services(&self) -> Result<Vec<Service>, ClientError>;
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ClientError>;
}

/// [`ResourceReader`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeReader {
    client: Client,
    namespace: String,
}

impl KubeReader {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_namespaced<K>(&self) -> Result<Vec<K>, ClientError>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_cluster<K>(&self) -> Result<Vec<K>, ClientError>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait]
impl ResourceReader for KubeReader {
    async fn list_pools(&self) -> Result<Vec<IPAddressPool>, ClientError> {
        self.list_namespaced().await
    }

    async fn list_legacy_pools(&self) -> Result<Vec<AddressPool>, ClientError> {
        self.list_namespaced().await
    }

    async fn list_peers(&self) -> Result<Vec<BGPPeer>, ClientError> {
        self.list_namespaced().await
    }

    async fn list_bfd_profiles(&self) -> Result<Vec<BFDProfile>, ClientError> {
        self.list_namespaced().await
    }

    async fn list_bgp_advertisements(&self) -> Result<Vec<BGPAdvertisement>, ClientError> {
        self.list_namespaced().await
    }

    async fn list_l2_advertisements(&self) -> Result<Vec<L2Advertisement>, ClientError> {
        self.list_namespaced().await
    }

    async fn list_communities(&self) -> Result<Vec<Community>, ClientError> {
        self.list_namespaced().await
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, ClientError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClientError> {
        self.list_cluster().await
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>, ClientError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClientError> {
        self.list_cluster().await
    }

    async fn get_bgp_extras(&self) -> Result<BTreeMap<String, String>, ClientError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api
            .get_opt(BGP_EXTRAS_CONFIGMAP)
            .await?
            .and_then(|cm| cm.data)
            .unwrap_or_default())
    }

    async fn list_services(&self) -> Result<Vec<Service>, ClientError> {
        self.list_cluster().await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ClientError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
