//! gamenet Controller
//!
//! Exposes game-server pods to the outside network by booking ports on
//! shared external load balancers, or by provisioning dedicated prewarmed
//! load-balancer and elastic-IP pools per workload set.
//!
//! The allocator keeps no database of its own: its state is rebuilt from
//! the cluster's network objects at every start.

mod allocator;
mod backoff;
mod config;
#[cfg(test)]
mod config_test;
mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use std::env;

use tracing::info;

use crate::config::AllocatorConfig;
use crate::controller::Controller;
use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting gamenet controller");

    // Load configuration from environment variables
    let allocator_config = AllocatorConfig::from_env()?;
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!(
        "  Port range: [{}, {})",
        allocator_config.min_port, allocator_config.max_port
    );
    info!("  Blocked ports: {:?}", allocator_config.blocked_ports);
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );

    // Initialize and run controller
    let controller = Controller::new(allocator_config, namespace).await?;
    controller.run().await?;

    Ok(())
}
