//! Reconcilers
//!
//! Each reconciler implements [`crate::runner::Reconcile`] and is driven by
//! [`crate::runner::run_reconciler`], except the aggregate status reconciler
//! which runs under `kube_runtime::Controller`.

mod config;
mod node;
mod pool_status;
mod service;
mod state;


pub use config::ConfigReconciler;
pub use node::NodeReconciler;
pub use pool_status::PoolStatusReconciler;
pub use service::ServiceReconciler;
pub use state::{ConfigurationStateReconciler, reconcile_state};
