//! Convergence engine
//!
//! One reconcile reads the AppService and both managed objects, decides from
//! the recorded last-applied spec whether this is a first convergence, a no-op
//! or an update, and issues only the writes that follow from that. Any store
//! failure aborts the run and is returned; the next run picks up from whatever
//! was already written.

use super::exposure::apply_owned_fields;
use super::spec_tracker::{is_recorded, recall, record, DecodeError};
use super::synthesizer::{synthesize, ManagedResources};
use super::workload::owned_fields_match;
use super::{Outcome, Reconciler};
use crate::error::ControllerError;
use crds::{AppService, AppServiceSpec};
use futures::FutureExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use store_client::{Operation, OptionalExt, ResourceKind};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Log a failed store call with what was being done, then hand the error on.
/// Namespace and name come from the enclosing `reconcile` span.
fn failed(op: Operation, kind: ResourceKind, err: impl Into<ControllerError>) -> ControllerError {
    let err = err.into();
    error!(operation = %op, %kind, error = %err, "store call failed");
    err
}

impl Reconciler {
    /// Drive the managed Deployment and Service of one AppService toward its spec.
    pub async fn reconcile_app_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Outcome, ControllerError> {
        let span = info_span!("reconcile", namespace, name);
        self.converge(namespace, name).instrument(span).await
    }

    async fn converge(&self, namespace: &str, name: &str) -> Result<Outcome, ControllerError> {
        debug!("Reconciling AppService");

        let app = match self.store.get_app_service(namespace, name).await.optional() {
            Ok(Some(app)) => app,
            Ok(None) => {
                debug!("AppService not found, nothing to do");
                return Ok(Outcome::Absent);
            }
            Err(e) => return Err(failed(Operation::Get, ResourceKind::AppService, e)),
        };
        if app.metadata.deletion_timestamp.is_some() {
            debug!("AppService is being deleted, leaving managed resources to garbage collection");
            return Ok(Outcome::Deleting);
        }

        let workload = self
            .store
            .get_deployment(namespace, name)
            .await
            .optional()
            .map_err(|e| failed(Operation::Get, ResourceKind::Deployment, e))?;
        let exposure = self
            .store
            .get_service(namespace, name)
            .await
            .optional()
            .map_err(|e| failed(Operation::Get, ResourceKind::Service, e))?;

        let desired = synthesize(&app)?;

        match recall(&app) {
            Err(DecodeError::Missing) => self.create(app, desired, workload, exposure).await,
            Err(e) => {
                error!(error = %e, "last-applied spec is unreadable, refusing to converge");
                Err(e.into())
            }
            Ok(last) if last.matches(&app.spec) => {
                self.ensure_present(desired, workload, exposure).await
            }
            Ok(_) => self.update(app, desired, workload, exposure).await,
        }
    }

    /// First convergence. Objects that already exist, typically left by an
    /// earlier run that failed part way, are only written when their owned
    /// fields no longer match the current spec.
    async fn create(
        &self,
        app: AppService,
        desired: ManagedResources,
        workload: Option<Deployment>,
        exposure: Option<Service>,
    ) -> Result<Outcome, ControllerError> {
        info!("No completed convergence recorded, creating managed resources");

        match workload {
            None => self.create_workload(&desired.workload).await?,
            Some(live) if owned_fields_match(&live, &desired.workload) => {
                debug!("Deployment already exists and matches, leaving it as is")
            }
            Some(live) => self.update_workload(live, &desired.workload).await?,
        }
        match exposure {
            None => self.create_exposure(&desired.exposure).await?,
            Some(live) => self.update_exposure(live, &desired.exposure).await?,
        }

        let applied = app.spec.clone();
        self.persist_fingerprint(app, &applied).await?;
        Ok(Outcome::Created)
    }

    /// No drift: only recreate what was removed out of band.
    async fn ensure_present(
        &self,
        desired: ManagedResources,
        workload: Option<Deployment>,
        exposure: Option<Service>,
    ) -> Result<Outcome, ControllerError> {
        let mut repaired = false;
        if workload.is_none() {
            warn!("Deployment is missing, recreating");
            self.create_workload(&desired.workload).await?;
            repaired = true;
        }
        if exposure.is_none() {
            warn!("Service is missing, recreating");
            self.create_exposure(&desired.exposure).await?;
            repaired = true;
        }

        if repaired {
            Ok(Outcome::Repaired)
        } else {
            debug!("No drift, nothing to do");
            Ok(Outcome::Unchanged)
        }
    }

    /// Drift: replace the Deployment spec, rewrite the Service fields that
    /// differ, then record the spec that was applied.
    async fn update(
        &self,
        app: AppService,
        desired: ManagedResources,
        workload: Option<Deployment>,
        exposure: Option<Service>,
    ) -> Result<Outcome, ControllerError> {
        info!("Spec changed since last convergence, updating managed resources");

        match workload {
            None => self.create_workload(&desired.workload).await?,
            Some(live) => self.update_workload(live, &desired.workload).await?,
        }
        match exposure {
            None => self.create_exposure(&desired.exposure).await?,
            Some(live) => self.update_exposure(live, &desired.exposure).await?,
        }

        let applied = app.spec.clone();
        self.persist_fingerprint(app, &applied).await?;
        Ok(Outcome::Updated)
    }

    async fn create_workload(&self, desired: &Deployment) -> Result<(), ControllerError> {
        self.store
            .create_deployment(desired)
            .await
            .map_err(|e| failed(Operation::Create, ResourceKind::Deployment, e))?;
        info!(kind = %ResourceKind::Deployment, "Created Deployment");
        Ok(())
    }

    async fn create_exposure(&self, desired: &Service) -> Result<(), ControllerError> {
        self.store
            .create_service(desired)
            .await
            .map_err(|e| failed(Operation::Create, ResourceKind::Service, e))?;
        info!(kind = %ResourceKind::Service, "Created Service");
        Ok(())
    }

    async fn update_workload(&self, live: Deployment, desired: &Deployment) -> Result<(), ControllerError> {
        let (namespace, name) = identity(&live.metadata);
        let spec = desired.spec.clone();

        self.conflict_retry
            .update::<_, ControllerError, _, _, _>(
                ResourceKind::Deployment,
                live,
                |deployment| {
                    deployment.spec = spec.clone();
                    Ok(true)
                },
                || self.store.get_deployment(&namespace, &name),
                |deployment| async move { self.store.update_deployment(&deployment).await }.boxed(),
            )
            .await
            .map_err(|e| failed(Operation::Update, ResourceKind::Deployment, e))?;
        info!(kind = %ResourceKind::Deployment, "Updated Deployment");
        Ok(())
    }

    async fn update_exposure(&self, live: Service, desired: &Service) -> Result<(), ControllerError> {
        let (namespace, name) = identity(&live.metadata);

        let written = self
            .conflict_retry
            .update::<_, ControllerError, _, _, _>(
                ResourceKind::Service,
                live,
                |service| {
                    let changes = apply_owned_fields(service, desired);
                    if changes.any() {
                        debug!(
                            service_type = changes.service_type,
                            ports = changes.ports,
                            selector = changes.selector,
                            "Service fields differ"
                        );
                    }
                    Ok(changes.any())
                },
                || self.store.get_service(&namespace, &name),
                |service| async move { self.store.update_service(&service).await }.boxed(),
            )
            .await
            .map_err(|e| failed(Operation::Update, ResourceKind::Service, e))?;

        match written {
            Some(_) => info!(kind = %ResourceKind::Service, "Updated Service"),
            None => debug!("Service already matches, skipping update"),
        }
        Ok(())
    }

    /// Store `applied` as the last-applied spec on the AppService.
    ///
    /// After a conflict the AppService is re-read and the same `applied` spec
    /// is recorded again, even if the user changed the spec meanwhile; the
    /// next reconcile then sees that change as drift.
    async fn persist_fingerprint(&self, app: AppService, applied: &AppServiceSpec) -> Result<(), ControllerError> {
        let (namespace, name) = identity(&app.metadata);

        let written = self
            .conflict_retry
            .update::<_, ControllerError, _, _, _>(
                ResourceKind::AppService,
                app,
                |app| {
                    if is_recorded(app, applied) {
                        return Ok(false);
                    }
                    record(app, applied)?;
                    Ok(true)
                },
                || self.store.get_app_service(&namespace, &name),
                |app| async move { self.store.update_app_service(&app).await }.boxed(),
            )
            .await
            .map_err(|e| failed(Operation::Update, ResourceKind::AppService, e))?;

        if written.is_some() {
            debug!("Recorded last-applied spec");
        }
        Ok(())
    }
}

fn identity(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}
