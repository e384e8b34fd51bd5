//! Config builder error types.
//!
//! Every variant names the offending object so the message alone tells an
//! operator which resource to fix. Messages are surfaced verbatim in
//! admission denials and status conditions.

use crate::cidr::CidrError;
use crate::community::CommunityError;
use crate::duration::DurationError;
use crate::selector::SelectorError;
use thiserror::Error;

/// Errors that can occur while building a [`crate::Config`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Pool address that is neither a CIDR nor a valid range
    #[error("invalid CIDR {cidr:?} in pool {pool:?}: {source}")]
    InvalidCidr {
        pool: String,
        cidr: String,
        #[source]
        source: CidrError,
    },

    /// Two pool prefixes overlap
    #[error("CIDR {cidr:?} in pool {pool:?} overlaps with already defined CIDR {existing:?}")]
    OverlappingCidr {
        cidr: String,
        pool: String,
        existing: String,
    },

    /// Same pool name used twice
    #[error("duplicate definition of pool {0:?}")]
    DuplicatePool(String),

    /// Structurally invalid pool
    #[error("invalid pool {pool:?}: {reason}")]
    InvalidPool { pool: String, reason: String },

    /// Structurally invalid peer
    #[error("parsing peer {peer}: {reason}")]
    InvalidPeer { peer: String, reason: String },

    /// Peer timer that does not parse
    #[error("parsing peer {peer}: invalid {field}: {source}")]
    InvalidPeerTimer {
        peer: String,
        field: &'static str,
        #[source]
        source: DurationError,
    },

    /// Peer pointing at a BFD profile that does not exist
    #[error("peer {peer} referencing non existing bfd profile {profile}")]
    MissingBfdProfile { peer: String, profile: String },

    /// Password secret problems
    #[error("parsing peer {peer}: {reason}")]
    PasswordSecret { peer: String, reason: String },

    /// Two peers with identical session parameters
    #[error("peer {0} already exists")]
    DuplicatePeer(String),

    /// BFD profile value out of range
    #[error("invalid bfd profile {profile:?}: {reason}")]
    InvalidBfdProfile { profile: String, reason: String },

    /// Same BFD profile name used twice
    #[error("duplicate definition of bfd profile {0:?}")]
    DuplicateBfdProfile(String),

    /// Community alias value that does not parse
    #[error("parsing community {owner}/{alias}: {source}")]
    InvalidCommunityAlias {
        owner: String,
        alias: String,
        #[source]
        source: CommunityError,
    },

    /// Same community alias defined twice
    #[error("duplicate definition of community {0:?}")]
    DuplicateCommunityAlias(String),

    /// Structurally invalid BGP advertisement
    #[error("parsing bgp advertisement {adv:?}: {reason}")]
    InvalidBgpAdvertisement { adv: String, reason: String },

    /// Structurally invalid L2 advertisement
    #[error("parsing l2 advertisement {adv:?}: {reason}")]
    InvalidL2Advertisement { adv: String, reason: String },

    /// Label selector that does not compile
    #[error("invalid label selector in {owner}: {source}")]
    InvalidSelector {
        owner: String,
        #[source]
        source: SelectorError,
    },

    /// Resource combination rejected by the active validation policy or by
    /// a whole-config consistency check
    #[error("{0}")]
    Unsupported(String),
}

impl ConfigError {
    pub(crate) fn peer(peer: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPeer {
            peer: peer.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bgp_adv(adv: &str, reason: impl Into<String>) -> Self {
        Self::InvalidBgpAdvertisement {
            adv: adv.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn selector(owner: impl Into<String>, source: SelectorError) -> Self {
        Self::InvalidSelector {
            owner: owner.into(),
            source,
        }
    }
}
