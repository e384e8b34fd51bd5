//! Load-balancer CRD Definitions
//!
//! Kubernetes Custom Resource Definitions read and written by the
//! load-balancer controller and speakers.

pub mod common;
pub mod ip_address_pool;
pub mod address_pool;
pub mod bgp_peer;
pub mod bfd_profile;
pub mod bgp_advertisement;
pub mod l2_advertisement;
pub mod community;
pub mod configuration_state;
pub mod frr_configuration;

pub use common::*;
pub use ip_address_pool::*;
pub use address_pool::*;
pub use bgp_peer::*;
pub use bfd_profile::*;
pub use bgp_advertisement::*;
pub use l2_advertisement::*;
pub use community::*;
pub use configuration_state::*;
pub use frr_configuration::*;
