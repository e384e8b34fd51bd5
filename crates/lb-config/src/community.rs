//! BGP community values.
//!
//! Two textual forms are accepted: the legacy `AA:NN` form (two 16-bit
//! halves) and the large form `large:GA:LD1:LD2` (three 32-bit parts).

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const LARGE_PREFIX: &str = "large:";

/// Errors produced while parsing a community.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommunityError {
    #[error("invalid community value {0:?}: expected AA:NN or large:GA:LD1:LD2")]
    Format(String),

    #[error("invalid first section of community {0:?}: {1}")]
    FirstSection(String, String),

    #[error("invalid second section of community {0:?}: {1}")]
    SecondSection(String, String),

    #[error("invalid large community {0:?}: {1}")]
    Large(String, String),
}

/// A parsed BGP community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BgpCommunity {
    /// RFC 1997 community packed as `(AA << 16) + NN`
    Legacy(u32),
    /// RFC 8092 large community
    Large {
        global_admin: u32,
        local_data1: u32,
        local_data2: u32,
    },
}

impl BgpCommunity {
    /// Whether this is an RFC 1997 community.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

impl FromStr for BgpCommunity {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(LARGE_PREFIX) {
            let parts: Vec<&str> = rest.split(':').collect();
            let [ga, ld1, ld2] = parts.as_slice() else {
                return Err(CommunityError::Format(s.to_string()));
            };
            let parse = |v: &str| {
                v.parse::<u32>()
                    .map_err(|e| CommunityError::Large(s.to_string(), e.to_string()))
            };
            return Ok(Self::Large {
                global_admin: parse(ga)?,
                local_data1: parse(ld1)?,
                local_data2: parse(ld2)?,
            });
        }

        let Some((high, low)) = s.split_once(':') else {
            return Err(CommunityError::Format(s.to_string()));
        };
        let high = high
            .parse::<u16>()
            .map_err(|e| CommunityError::FirstSection(s.to_string(), e.to_string()))?;
        let low = low
            .parse::<u16>()
            .map_err(|e| CommunityError::SecondSection(s.to_string(), e.to_string()))?;
        Ok(Self::Legacy((u32::from(high) << 16) + u32::from(low)))
    }
}

impl fmt::Display for BgpCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy(v) => write!(f, "{}:{}", v >> 16, v & 0xffff),
            Self::Large {
                global_admin,
                local_data1,
                local_data2,
            } => write!(f, "{LARGE_PREFIX}{global_admin}:{local_data1}:{local_data2}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_community_packing() {
        let c: BgpCommunity = "1234:2345".parse().expect("valid community");
        assert_eq!(c, BgpCommunity::Legacy((1234 << 16) + 2345));
        assert!(c.is_legacy());
        assert_eq!(c.to_string(), "1234:2345");
    }

    #[test]
    fn test_large_community() {
        let c: BgpCommunity = "large:123:456:789".parse().expect("valid community");
        assert!(!c.is_legacy());
        assert_eq!(c.to_string(), "large:123:456:789");
    }

    #[test]
    fn test_invalid_communities() {
        assert!(matches!("1234".parse::<BgpCommunity>(), Err(CommunityError::Format(_))));
        assert!(matches!("99999:1".parse::<BgpCommunity>(), Err(CommunityError::FirstSection(..))));
        assert!(matches!("1:99999".parse::<BgpCommunity>(), Err(CommunityError::SecondSection(..))));
        assert!(matches!("large:1:2".parse::<BgpCommunity>(), Err(CommunityError::Format(_))));
        assert!(matches!("large:1:x:2".parse::<BgpCommunity>(), Err(CommunityError::Large(..))));
    }
}
