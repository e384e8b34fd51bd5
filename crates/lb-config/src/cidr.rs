//! Address parsing for pool definitions.
//!
//! A pool address is either a CIDR or an inclusive `start-end` range. Ranges
//! are summarized into the smallest list of CIDRs covering exactly the range.

use ipnet::{IpNet, Ipv4Subnets, Ipv6Subnets};
use std::net::IpAddr;
use thiserror::Error;

/// Errors produced while parsing a pool address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("invalid CIDR {0:?}")]
    InvalidCidr(String),

    #[error("invalid IP range {0:?}: invalid start IP {1:?}")]
    InvalidStart(String, String),

    #[error("invalid IP range {0:?}: invalid end IP {1:?}")]
    InvalidEnd(String, String),

    #[error("invalid IP range {0:?}: start IP {1:?} is after the end IP {2:?}")]
    StartAfterEnd(String, String, String),

    #[error("invalid IP range {0:?}: IP family mismatch between start and end")]
    MixedFamilies(String),
}

/// Address family of a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Family of a prefix.
    pub fn of(net: &IpNet) -> Self {
        match net {
            IpNet::V4(_) => Self::V4,
            IpNet::V6(_) => Self::V6,
        }
    }

    /// Family of an address.
    pub fn of_addr(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

/// Parses a CIDR (`10.0.0.0/24`) or a range (`10.0.0.1 - 10.0.0.9`).
///
/// Host bits of a CIDR are masked off, so `10.0.0.7/24` yields `10.0.0.0/24`.
pub fn parse_cidr(input: &str) -> Result<Vec<IpNet>, CidrError> {
    let Some((start, end)) = input.split_once('-') else {
        let net: IpNet = input
            .trim()
            .parse()
            .map_err(|_| CidrError::InvalidCidr(input.to_string()))?;
        return Ok(vec![net.trunc()]);
    };

    let start = start.trim();
    let end = end.trim();
    let start_ip: IpAddr = start
        .parse()
        .map_err(|_| CidrError::InvalidStart(input.to_string(), start.to_string()))?;
    let end_ip: IpAddr = end
        .parse()
        .map_err(|_| CidrError::InvalidEnd(input.to_string(), end.to_string()))?;

    match (start_ip, end_ip) {
        (IpAddr::V4(s), IpAddr::V4(e)) => {
            if s > e {
                return Err(CidrError::StartAfterEnd(input.to_string(), start.to_string(), end.to_string()));
            }
            Ok(Ipv4Subnets::new(s, e, 0).map(IpNet::V4).collect())
        }
        (IpAddr::V6(s), IpAddr::V6(e)) => {
            if s > e {
                return Err(CidrError::StartAfterEnd(input.to_string(), start.to_string(), end.to_string()));
            }
            Ok(Ipv6Subnets::new(s, e, 0).map(IpNet::V6).collect())
        }
        _ => Err(CidrError::MixedFamilies(input.to_string())),
    }
}

/// One address entry of a pool together with the prefixes it expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    pub raw: String,
    pub cidrs: Vec<IpNet>,
}

impl AddressRange {
    pub fn parse(raw: &str) -> Result<Self, CidrError> {
        Ok(Self {
            raw: raw.to_string(),
            cidrs: parse_cidr(raw)?,
        })
    }

    /// The first `(prefix, aggregation length)` pair where the aggregation
    /// length is shorter than the widest prefix of this entry.
    pub fn incompatible_aggregation(&self, v4: u8, v6: u8) -> Option<(u8, u8)> {
        let (low4, low6) = lowest_mask(&self.cidrs);
        match (low4, low6) {
            (Some(m), _) if v4 < m => Some((m, v4)),
            (_, Some(m)) if v6 < m => Some((m, v6)),
            _ => None,
        }
    }
}

/// Two prefixes overlap when either one contains the other.
pub fn cidrs_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(b) || b.contains(a)
}

/// Shortest prefix length among `nets`, split by family.
///
/// Returns `(v4, v6)`; a family absent from `nets` yields `None`.
pub fn lowest_mask(nets: &[IpNet]) -> (Option<u8>, Option<u8>) {
    let mut v4 = None;
    let mut v6 = None;
    for net in nets {
        let slot = match IpFamily::of(net) {
            IpFamily::V4 => &mut v4,
            IpFamily::V6 => &mut v6,
        };
        *slot = Some(slot.map_or(net.prefix_len(), |m: u8| m.min(net.prefix_len())));
    }
    (v4, v6)
}

/// Number of addresses in a prefix, saturating for large IPv6 prefixes.
pub fn size_of(net: &IpNet) -> u64 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    if host_bits >= 64 {
        u64::MAX
    } else {
        1u64 << host_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nets(items: &[&str]) -> Vec<IpNet> {
        items.iter().map(|s| s.parse().expect("valid test cidr")).collect()
    }

    #[test]
    fn test_plain_cidr_is_masked() {
        assert_eq!(parse_cidr("10.20.0.7/24").expect("valid"), nets(&["10.20.0.0/24"]));
    }

    #[test]
    fn test_range_is_summarized() {
        assert_eq!(
            parse_cidr("1.1.1.1-1.1.1.6").expect("valid"),
            nets(&["1.1.1.1/32", "1.1.1.2/31", "1.1.1.4/31", "1.1.1.6/32"])
        );
        assert_eq!(parse_cidr(" 10.0.0.0 - 10.0.0.255 ").expect("valid"), nets(&["10.0.0.0/24"]));
    }

    #[test]
    fn test_single_address_range() {
        assert_eq!(parse_cidr("1.2.3.4-1.2.3.4").expect("valid"), nets(&["1.2.3.4/32"]));
    }

    #[test]
    fn test_ipv6_range() {
        assert_eq!(parse_cidr("2001:db8::-2001:db8::ff").expect("valid"), nets(&["2001:db8::/120"]));
    }

    #[test]
    fn test_range_errors() {
        assert!(matches!(parse_cidr("1.1.1.9-1.1.1.1"), Err(CidrError::StartAfterEnd(..))));
        assert!(matches!(parse_cidr("1.1.1.1-2001:db8::1"), Err(CidrError::MixedFamilies(_))));
        assert!(matches!(parse_cidr("foo-1.1.1.1"), Err(CidrError::InvalidStart(..))));
        assert!(matches!(parse_cidr("1.1.1.1/33"), Err(CidrError::InvalidCidr(_))));
        assert!(matches!(parse_cidr("1.1.1.1"), Err(CidrError::InvalidCidr(_))));
    }

    #[test]
    fn test_overlap_is_containment() {
        let a: IpNet = "10.0.0.0/24".parse().expect("valid");
        let b: IpNet = "10.0.0.128/25".parse().expect("valid");
        let c: IpNet = "10.0.1.0/24".parse().expect("valid");
        assert!(cidrs_overlap(&a, &b));
        assert!(cidrs_overlap(&b, &a));
        assert!(!cidrs_overlap(&a, &c));
    }

    #[test]
    fn test_lowest_mask_per_family() {
        let parsed = parse_cidr("3.3.3.2-3.3.3.254").expect("valid");
        assert_eq!(lowest_mask(&parsed), (Some(26), None));
        assert_eq!(lowest_mask(&nets(&["2001:db8::/64", "10.0.0.0/30"])), (Some(30), Some(64)));
    }

    #[test]
    fn test_aggregation_against_range() {
        let range = AddressRange::parse("3.3.3.2-3.3.3.254").expect("valid");
        assert_eq!(range.incompatible_aggregation(24, 128), Some((26, 24)));
        assert_eq!(range.incompatible_aggregation(26, 128), None);
        assert_eq!(range.incompatible_aggregation(32, 128), None);

        let v6 = AddressRange::parse("2001:db8::/64").expect("valid");
        assert_eq!(v6.incompatible_aggregation(0, 48), Some((64, 48)));
    }

    #[test]
    fn test_size_of() {
        assert_eq!(size_of(&"10.0.0.0/30".parse().expect("valid")), 4);
        assert_eq!(size_of(&"2001:db8::/32".parse().expect("valid")), u64::MAX);
    }
}
