//! Kubernetes resource watchers.
//!
//! AppService objects are watched through `kube_runtime::Controller`, which
//! handles reconnection, serializes reconciles per object and runs different
//! objects concurrently. Deployments and Services carrying an AppService
//! controller owner reference are watched too, so out-of-band edits or
//! deletions of managed objects trigger a reconcile of their owner.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::AppService;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    controller::{Action, Config as RuntimeConfig},
    watcher, Controller,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn resource_key(app: &AppService) -> (String, String) {
    (app.namespace().unwrap_or_default(), app.name_any())
}

async fn reconcile(app: Arc<AppService>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let (namespace, name) = resource_key(&app);
    let outcome = ctx.reconcile_app_service(&namespace, &name).await?;
    debug!(%namespace, %name, %outcome, "Reconcile finished");
    ctx.reset_error(&format!("{}/{}", namespace, name));
    Ok(Action::await_change())
}

/// Requeue failed reconciles with a per-object Fibonacci backoff.
fn error_policy(app: Arc<AppService>, err: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let (namespace, name) = resource_key(&app);
    let key = format!("{}/{}", namespace, name);
    ctx.increment_error(&key);
    let (backoff_seconds, error_count) = ctx.get_backoff_for_resource(&key);
    warn!(
        %namespace,
        %name,
        error = %err,
        error_count,
        backoff_seconds,
        "Reconcile failed, requeueing"
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Watches AppService resources and their managed objects.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    app_service_api: Api<AppService>,
    deployment_api: Api<Deployment>,
    service_api: Api<Service>,
    runtime_config: RuntimeConfig,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher scoped to `config.namespace` (or all namespaces).
    pub fn new(client: Client, reconciler: Arc<Reconciler>, config: &ControllerConfig) -> Self {
        let (app_service_api, deployment_api, service_api) = match config.namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client, ns),
            ),
            None => (
                Api::all(client.clone()),
                Api::all(client.clone()),
                Api::all(client),
            ),
        };

        // Debounce batches bursts of events for the same object; concurrency
        // bounds how many objects reconcile at once
        let runtime_config = RuntimeConfig::default()
            .debounce(config.debounce)
            .concurrency(config.concurrency);

        Self {
            reconciler,
            app_service_api,
            deployment_api,
            service_api,
            runtime_config,
        }
    }

    /// Starts watching AppService resources. Runs until the watch stream ends.
    pub async fn watch_app_services(&self) -> Result<(), ControllerError> {
        info!("Starting AppService watcher");

        Controller::new(self.app_service_api.clone(), watcher::Config::default())
            .owns(self.deployment_api.clone(), watcher::Config::default())
            .owns(self.service_api.clone(), watcher::Config::default())
            .with_config(self.runtime_config.clone())
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!(namespace = ?object.namespace, name = %object.name, "Reconciled"),
                    Err(e) => error!("Controller error for AppService: {}", e),
                }
            })
            .await;

        info!("AppService watcher stopped");
        Ok(())
    }
}
