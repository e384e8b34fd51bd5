//! Gathers a [`ClusterResources`] snapshot through a [`ResourceReader`].

use crate::error::ClientError;
use crate::reader::ResourceReader;
use lb_config::ClusterResources;
use tracing::{debug, warn};

/// Which part of the resource set a reconciler consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Every resource kind (speaker side)
    Full,
    /// Pools, legacy pools, communities and namespaces (controller side)
    Pools,
}

/// Lists every resource of `domain` and returns them canonicalized.
///
/// Secrets are only fetched for peers that reference one; a missing secret
/// is left out so the builder reports it against the peer.
pub async fn collect_resources(
    reader: &dyn ResourceReader,
    domain: Domain,
) -> Result<ClusterResources, ClientError> {
    let mut resources = ClusterResources {
        pools: reader.list_pools().await?,
        legacy_pools: reader.list_legacy_pools().await?,
        communities: reader.list_communities().await?,
        namespaces: reader.list_namespaces().await?,
        ..Default::default()
    };

    if domain == Domain::Full {
        resources.peers = reader.list_peers().await?;
        resources.bfd_profiles = reader.list_bfd_profiles().await?;
        resources.bgp_advertisements = reader.list_bgp_advertisements().await?;
        resources.l2_advertisements = reader.list_l2_advertisements().await?;
        resources.nodes = reader.list_nodes().await?;
        resources.bgp_extras = reader.get_bgp_extras().await?;

        for secret_ref in resources.peers.iter().filter_map(|p| p.spec.password_secret.as_ref()) {
            if resources.password_secrets.contains_key(&secret_ref.name) {
                continue;
            }
            match reader.get_secret(&secret_ref.name).await? {
                Some(secret) => {
                    resources.password_secrets.insert(secret_ref.name.clone(), secret);
                }
                None => warn!("Password secret {} referenced by a peer does not exist", secret_ref.name),
            }
        }
    }

    debug!(
        ?domain,
        pools = resources.pools.len(),
        peers = resources.peers.len(),
        "Collected cluster resources"
    );
    Ok(resources.canonicalize())
}
