//! Lease Monitor
//!
//! Follows one coordination Lease through a resumable watch and logs every
//! leadership transition seen from this instance's point of view.
//!
//! Environment:
//! - `LEASE_NAMESPACE` (default `default`), `LEASE_NAME` (required)
//! - `LEASE_IDENTITY` (default `$HOSTNAME-<uuid>`)
//! - the watch settings read by `resume_watch::WatchSettings`

mod controller;
mod error;

use crate::error::ControllerError;
use controller::Controller;
use resume_watch::{ConfigError, LeaderElectionConfig, WatchSettings};
use std::env;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting Lease Monitor");

    let election = election_config()?;
    election.validate()?;
    let settings = WatchSettings::from_env()?;

    info!("Configuration:");
    info!("  Lease: {}/{}", election.namespace, election.lease_name);
    info!("  Identity: {}", election.identity);
    info!("  Watch timeout: {}s", settings.timeout_seconds);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let controller = Controller::new(election, &settings).await?;
    controller.run(cancel).await?;

    info!("Lease Monitor stopped");
    Ok(())
}

fn election_config() -> Result<LeaderElectionConfig, ConfigError> {
    let namespace = env::var("LEASE_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let lease_name = env::var("LEASE_NAME")
        .map_err(|_| ConfigError::Missing("LEASE_NAME".to_string()))?;
    let identity = env::var("LEASE_IDENTITY").unwrap_or_else(|_| {
        let host = env::var("HOSTNAME").unwrap_or_else(|_| "lease-monitor".to_string());
        format!("{host}-{}", uuid::Uuid::new_v4())
    });
    Ok(LeaderElectionConfig::new(namespace, lease_name, identity))
}
