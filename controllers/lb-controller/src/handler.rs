//! Seams between the reconcilers and the announcement side.
//!
//! A reconciler collects and validates; what the configuration is used for
//! is up to the injected handler, which answers with a [`SyncState`].

use crate::trigger::ObjectKey;
use crds::IPAddressPoolStatus;
use k8s_openapi::api::core::v1::{Node, Service};
use lb_config::Config;
use std::fmt;

/// Outcome of handing a configuration or object to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Success,
    /// Transient failure; the trigger is retried with backoff
    Error,
    /// Applied, and every dependent object must be re-evaluated
    ReprocessAll,
    /// Permanent failure; reported but not retried
    ErrorNoRetry,
}

impl SyncState {
    /// Whether the state is reported as a passing condition.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Success | Self::ReprocessAll)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "SyncStateSuccess",
            Self::Error => "SyncStateError",
            Self::ReprocessAll => "SyncStateReprocessAll",
            Self::ErrorNoRetry => "SyncStateErrorNoRetry",
        };
        f.write_str(s)
    }
}

/// Consumes validated configurations.
pub trait ConfigHandler: Send + Sync {
    fn handle(&self, config: &Config) -> SyncState;
}

/// Consumes updates of the node a speaker runs on.
pub trait NodeHandler: Send + Sync {
    fn handle_node(&self, node: &Node) -> SyncState;
}

/// Consumes service changes; `None` means the service was deleted.
pub trait ServiceHandler: Send + Sync {
    fn handle_service(&self, key: &ObjectKey, service: Option<&Service>) -> SyncState;
}

/// Usage counters of a pool, as known to the address allocator.
pub trait PoolCountersFetcher: Send + Sync {
    fn pool_counters(&self, pool: &str) -> Option<IPAddressPoolStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_names() {
        assert_eq!(SyncState::Success.to_string(), "SyncStateSuccess");
        assert_eq!(SyncState::Error.to_string(), "SyncStateError");
        assert_eq!(SyncState::ReprocessAll.to_string(), "SyncStateReprocessAll");
        assert_eq!(SyncState::ErrorNoRetry.to_string(), "SyncStateErrorNoRetry");
    }

    #[test]
    fn test_healthy_states() {
        assert!(SyncState::Success.is_healthy());
        assert!(SyncState::ReprocessAll.is_healthy());
        assert!(!SyncState::Error.is_healthy());
        assert!(!SyncState::ErrorNoRetry.is_healthy());
    }
}
