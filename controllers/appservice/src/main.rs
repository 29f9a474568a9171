//! AppService Controller
//!
//! Keeps a Deployment and a Service in step with every AppService:
//! - creates both on first sight of an AppService
//! - rolls spec changes into the Deployment and the Service fields it owns
//! - recreates managed objects removed out of band
//!
//! The spec applied last is kept on the AppService in the `spec` annotation.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting AppService Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Concurrency: {}", config.concurrency);
    info!("  Debounce: {:?}", config.debounce);
    info!("  Conflict retry attempts: {}", config.conflict_retry_attempts);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
