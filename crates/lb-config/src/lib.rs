//! Load-balancer configuration model
//!
//! Turns the raw set of load-balancer custom resources into one validated,
//! immutable [`Config`] snapshot, and provides the address, community,
//! duration and selector parsing shared with the admission webhook.

pub mod cidr;
pub mod community;
pub mod config;
pub mod duration;
pub mod error;
pub mod redact;
pub mod resources;
pub mod selector;
pub mod validation;

#[cfg(any(test, feature = "test-util"))]
pub mod test_fixtures;

#[cfg(test)]
mod config_test;

pub use cidr::{AddressRange, CidrError, IpFamily, parse_cidr};
pub use community::{BgpCommunity, CommunityError};
pub use config::*;
pub use duration::{DurationError, format_duration, parse_duration};
pub use error::ConfigError;
pub use redact::RedactedString;
pub use resources::ClusterResources;
pub use selector::{Selector, SelectorError};
pub use validation::{Validation, validate_config};
