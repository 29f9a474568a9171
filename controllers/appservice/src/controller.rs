//! Main controller implementation.
//!
//! Builds the store client and reconciler, then runs the AppService watcher
//! in a background task until it stops or fails.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::conflict::ConflictRetry;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use kube::Client;
use std::sync::Arc;
use store_client::{StoreClient, StoreError};
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for AppService resources.
#[derive(Debug)]
pub struct Controller {
    app_service_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing AppService Controller");

        let kube_client = Client::try_default()
            .await
            .map_err(|e| ControllerError::Store(StoreError::Kube(e)))?;

        let reconciler = Arc::new(Reconciler::new(
            StoreClient::new(kube_client.clone()),
            ConflictRetry::new(config.conflict_retry_attempts),
        ));
        let watcher = Arc::new(Watcher::new(kube_client, reconciler, &config));

        let app_service_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_app_services().await })
        };

        Ok(Self { app_service_watcher })
    }

    /// Runs the controller until the watcher exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("AppService Controller running");

        self.app_service_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("AppService watcher panicked: {}", e)))?
            .map_err(|e| ControllerError::Watch(format!("AppService watcher error: {}", e)))?;

        info!("AppService Controller stopped");
        Ok(())
    }
}
