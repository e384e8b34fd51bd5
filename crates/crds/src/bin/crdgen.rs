//! Prints every custom resource definition as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crds.yaml`

use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, ConfigurationState,
    FRRConfiguration, IPAddressPool, L2Advertisement,
};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        IPAddressPool::crd(),
        AddressPool::crd(),
        BGPPeer::crd(),
        BFDProfile::crd(),
        BGPAdvertisement::crd(),
        L2Advertisement::crd(),
        Community::crd(),
        ConfigurationState::crd(),
        FRRConfiguration::crd(),
    ];

    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
