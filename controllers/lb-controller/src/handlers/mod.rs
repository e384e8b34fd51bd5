//! Built-in handlers wired behind the reconcilers.

mod address_book;
mod speaker;

pub use address_book::AddressBook;
pub use speaker::SpeakerState;

use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Ingress IPs published in a service's load-balancer status.
pub fn service_ips(service: &Service) -> BTreeSet<IpAddr> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|ingress| ingress.ip.as_deref())
        .filter_map(|ip| ip.parse().ok())
        .collect()
}
