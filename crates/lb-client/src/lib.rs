//! Kubernetes API access for the load-balancer controller
//!
//! Traits over every API interaction the reconcilers perform, with
//! implementations backed by [`kube`] and, behind the `test-util` feature,
//! in-memory mocks for unit tests.
//!
//! - [`ResourceReader`] lists the inputs of the config builder
//! - [`ConditionWriter`] owns condition entries of the shared status object
//! - [`FrrConfigClient`] manages the per-node FRRConfiguration objects
//! - [`PoolStatusWriter`] writes pool usage counters

pub mod collector;
pub mod error;
pub mod frr;
pub mod pool_status;
pub mod reader;
pub mod status;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;


pub use collector::{Domain, collect_resources};
pub use error::ClientError;
pub use frr::{FrrConfigClient, KubeFrrClient};
pub use pool_status::{KubePoolStatusWriter, PoolStatusWriter};
pub use reader::{BGP_EXTRAS_CONFIGMAP, KubeReader, ResourceReader};
pub use status::{ConditionWriter, KubeConditionWriter};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockFrrClient, MockPoolStatusWriter, MockReader, MockStatusStore};
