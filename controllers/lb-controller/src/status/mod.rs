//! Condition reporting into the shared ConfigurationState object.

pub mod aggregate;
pub mod conditions;
pub mod reporter;

pub use aggregate::compute_ready;
pub use conditions::{CONDITION_TYPE_READY, find_condition, set_condition};
pub use reporter::ConditionReporter;
