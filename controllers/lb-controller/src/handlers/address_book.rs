//! Controller-side view of pools and the addresses services hold in them.

use super::service_ips;
use crate::handler::{ConfigHandler, PoolCountersFetcher, ServiceHandler, SyncState};
use crate::trigger::ObjectKey;
use crds::IPAddressPoolStatus;
use k8s_openapi::api::core::v1::Service;
use lb_config::{Config, IpFamily, Pools};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Default)]
struct Book {
    pools: Option<Pools>,
    services: BTreeMap<ObjectKey, BTreeSet<IpAddr>>,
}

/// Tracks the current pools and every service's ingress IPs.
///
/// A change of the pool set answers `ReprocessAll` so services are
/// re-evaluated against the new pools.
#[derive(Default)]
pub struct AddressBook {
    book: Mutex<Book>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigHandler for AddressBook {
    fn handle(&self, config: &Config) -> SyncState {
        let mut book = self.lock();
        if book.pools.as_ref() == Some(&config.pools) {
            return SyncState::Success;
        }
        info!("Pool set changed, {} pools known", config.pools.by_name.len());
        book.pools = Some(config.pools.clone());
        SyncState::ReprocessAll
    }
}

impl ServiceHandler for AddressBook {
    fn handle_service(&self, key: &ObjectKey, service: Option<&Service>) -> SyncState {
        let mut book = self.lock();
        match service.map(service_ips) {
            Some(ips) if !ips.is_empty() => {
                debug!("Service {} holds {:?}", key, ips);
                book.services.insert(key.clone(), ips);
            }
            _ => {
                book.services.remove(key);
            }
        }
        SyncState::Success
    }
}

impl PoolCountersFetcher for AddressBook {
    fn pool_counters(&self, pool: &str) -> Option<IPAddressPoolStatus> {
        let book = self.lock();
        let pool = book.pools.as_ref()?.get(pool)?;

        let in_use: BTreeSet<&IpAddr> = book
            .services
            .values()
            .flatten()
            .filter(|ip| pool.contains(ip))
            .collect();
        let assigned = |family| in_use.iter().filter(|ip| IpFamily::of_addr(ip) == family).count() as u64;
        let assigned_ipv4 = assigned(IpFamily::V4);
        let assigned_ipv6 = assigned(IpFamily::V6);

        Some(IPAddressPoolStatus {
            assigned_ipv4,
            assigned_ipv6,
            available_ipv4: pool.size(IpFamily::V4).saturating_sub(assigned_ipv4),
            available_ipv6: pool.size(IpFamily::V6).saturating_sub(assigned_ipv6),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lb_service;
    use lb_config::test_fixtures::pool;
    use lb_config::{ClusterResources, Validation, build_config};
    use pretty_assertions::assert_eq;

    fn config(pools: Vec<crds::IPAddressPool>) -> Config {
        let resources = ClusterResources {
            pools,
            ..Default::default()
        };
        build_config(&resources.canonicalize(), Validation::DontValidate).expect("valid config")
    }

    #[test]
    fn test_pool_change_requests_reprocess() {
        let book = AddressBook::new();
        let first = config(vec![pool("pool-a", &["10.0.0.0/24"])]);
        assert_eq!(book.handle(&first), SyncState::ReprocessAll);
        assert_eq!(book.handle(&first), SyncState::Success);

        let second = config(vec![pool("pool-a", &["10.0.0.0/24"]), pool("pool-b", &["10.0.1.0/24"])]);
        assert_eq!(book.handle(&second), SyncState::ReprocessAll);
    }

    #[test]
    fn test_counters_per_family() {
        let book = AddressBook::new();
        book.handle(&config(vec![pool("pool-a", &["10.0.0.0/30", "2001:db8::/126"])]));

        let web = lb_service("default", "web", &["10.0.0.1", "2001:db8::1"]);
        let api = lb_service("default", "api", &["10.0.0.1", "10.0.0.2", "192.168.0.1"]);
        book.handle_service(&ObjectKey::from_resource(&web), Some(&web));
        book.handle_service(&ObjectKey::from_resource(&api), Some(&api));

        assert_eq!(
            book.pool_counters("pool-a"),
            Some(IPAddressPoolStatus {
                assigned_ipv4: 2,
                assigned_ipv6: 1,
                available_ipv4: 2,
                available_ipv6: 3,
            })
        );
        assert_eq!(book.pool_counters("missing"), None);
    }

    #[test]
    fn test_deleted_service_releases_addresses() {
        let book = AddressBook::new();
        book.handle(&config(vec![pool("pool-a", &["10.0.0.0/30"])]));
        let web = lb_service("default", "web", &["10.0.0.1"]);
        let key = ObjectKey::from_resource(&web);

        book.handle_service(&key, Some(&web));
        assert_eq!(book.pool_counters("pool-a").map(|s| s.assigned_ipv4), Some(1));
        book.handle_service(&key, None);
        assert_eq!(book.pool_counters("pool-a").map(|s| s.assigned_ipv4), Some(0));
    }

    #[test]
    fn test_no_config_means_no_counters() {
        assert_eq!(AddressBook::new().pool_counters("pool-a"), None);
    }
}
