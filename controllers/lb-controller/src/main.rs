//! Load-Balancer Controller
//!
//! Bare-metal load-balancer control plane. The same binary runs either the
//! cluster-wide controller (address pools, service bookkeeping, pool status,
//! aggregate configuration status and admission webhooks) or the per-node
//! speaker (full configuration, node labels and the FRR configuration pusher),
//! selected by `LB_COMPONENT`.

mod backoff;
mod controller;
mod error;
mod frr;
mod handler;
mod handlers;
mod metrics;
mod queue;
mod reconciler;
mod runner;
mod settings;
mod status;
mod trigger;
mod watcher;
mod webhook;

#[cfg(test)]
mod test_utils;

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::settings::{Component, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and axum-server both build rustls configs; pin the provider once
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    let settings = Settings::from_env()?;
    match &settings.component {
        Component::Controller => info!("Starting load-balancer controller"),
        Component::Speaker { node_name } => info!("Starting load-balancer speaker on node {}", node_name),
    }
    info!("Configuration:");
    info!("  Namespace: {}", settings.namespace);
    info!("  BGP type: {}", settings.bgp_type.as_str());
    info!("  Status object: {}", settings.config_status_name);
    info!("  Reconcile workers: {}", settings.reconcile_workers);
    if settings.enable_webhook {
        info!("  Webhook port: {}", settings.webhook_port);
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Cannot listen for interrupts: {}", e),
        }
    });

    let controller = Controller::new(settings, cancel).await?;
    controller.run().await?;

    Ok(())
}
