//! Mock StoreClient for unit testing
//!
//! In-memory implementation of `StoreClientTrait` that behaves like the API
//! server for the parts the operator depends on:
//! - objects are keyed by `namespace/name`
//! - every write bumps `metadata.resourceVersion`, and an update carrying a
//!   stale version fails with `StoreError::Conflict`
//! - creating a Service allocates a cluster IP, and `NodePort`/`LoadBalancer`
//!   Services get a node port for every port that lacks one
//!
//! Successful creates and updates are recorded so tests can assert exactly
//! which writes a reconcile issued. Failures can be injected one call at a time.

use crate::error::{Operation, ResourceKind, StoreError};
use crate::store_trait::StoreClientTrait;
use crds::AppService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A successful write observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub op: Operation,
    pub kind: ResourceKind,
    pub key: String,
}

/// Failure queued for the next matching call
#[derive(Debug, Clone)]
enum InjectedFailure {
    Unavailable(String),
    Conflict,
}

/// Mock StoreClient for testing
#[derive(Clone, Default)]
pub struct MockStoreClient {
    pub(crate) app_services: Arc<Mutex<HashMap<String, AppService>>>,
    pub(crate) deployments: Arc<Mutex<HashMap<String, Deployment>>>,
    pub(crate) services: Arc<Mutex<HashMap<String, Service>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failures: Arc<Mutex<HashMap<(Operation, ResourceKind), VecDeque<InjectedFailure>>>>,
    // Shared counter for resourceVersion, UID, cluster IP and node port allocation
    next_id: Arc<Mutex<u64>>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn meta_key(meta: &ObjectMeta, kind: ResourceKind) -> Result<(String, String, String), StoreError> {
    let name = meta
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} is missing metadata.name", kind)))?;
    let namespace = meta.namespace.clone().ok_or_else(|| {
        StoreError::InvalidObject(format!("{} {} is missing metadata.namespace", kind, name))
    })?;
    Ok((key(&namespace, &name), namespace, name))
}

impl MockStoreClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    fn record(&self, op: Operation, kind: ResourceKind, key: String) {
        self.calls.lock().unwrap().push(RecordedCall { op, kind, key });
    }

    fn take_failure(
        &self,
        op: Operation,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&(op, kind))
            .and_then(|queue| queue.pop_front());
        match failure {
            None => Ok(()),
            Some(InjectedFailure::Unavailable(msg)) => Err(StoreError::Unavailable(msg)),
            Some(InjectedFailure::Conflict) => Err(StoreError::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn stamp_new(&self, meta: &mut ObjectMeta) {
        let id = self.next_id();
        meta.resource_version = Some(id.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", id));
        }
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
    }

    fn check_version(
        stored: &ObjectMeta,
        incoming: &ObjectMeta,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        if incoming.resource_version.is_none() {
            return Err(StoreError::InvalidObject(format!(
                "{} {}/{} is missing metadata.resourceVersion",
                kind, namespace, name
            )));
        }
        if stored.resource_version != incoming.resource_version {
            return Err(StoreError::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn not_found(kind: ResourceKind, namespace: &str, name: &str) -> StoreError {
        StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn already_exists(kind: ResourceKind, namespace: &str, name: &str) -> StoreError {
        StoreError::AlreadyExists {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Fill in the fields the API server allocates for Services.
    fn allocate_service_fields(&self, service: &mut Service) {
        let Some(spec) = service.spec.as_mut() else {
            return;
        };
        if spec.cluster_ip.is_none() {
            let ip = format!("10.96.0.{}", self.next_id() % 250 + 1);
            spec.cluster_ip = Some(ip.clone());
            spec.cluster_ips = Some(vec![ip]);
        }
        let wants_node_ports = matches!(spec.type_.as_deref(), Some("NodePort") | Some("LoadBalancer"));
        if wants_node_ports {
            let missing: Vec<usize> = spec
                .ports
                .iter()
                .flatten()
                .enumerate()
                .filter(|(_, p)| p.node_port.is_none())
                .map(|(i, _)| i)
                .collect();
            for i in missing {
                let node_port = 30000 + (self.next_id() % 2000) as i32;
                if let Some(port) = spec.ports.as_mut().and_then(|ports| ports.get_mut(i)) {
                    port.node_port = Some(node_port);
                }
            }
        }
    }

    // Test setup

    /// Add an AppService to the mock store (assigns uid and resourceVersion)
    pub fn add_app_service(&self, mut app: AppService) -> AppService {
        self.stamp_new(&mut app.metadata);
        let (namespace, name) = (
            app.metadata.namespace.clone().unwrap_or_default(),
            app.metadata.name.clone().unwrap_or_default(),
        );
        self.app_services.lock().unwrap().insert(key(&namespace, &name), app.clone());
        app
    }

    /// Add a Deployment to the mock store
    pub fn add_deployment(&self, mut deployment: Deployment) -> Deployment {
        self.stamp_new(&mut deployment.metadata);
        let (namespace, name) = (
            deployment.metadata.namespace.clone().unwrap_or_default(),
            deployment.metadata.name.clone().unwrap_or_default(),
        );
        self.deployments.lock().unwrap().insert(key(&namespace, &name), deployment.clone());
        deployment
    }

    /// Add a Service to the mock store (allocates platform fields)
    pub fn add_service(&self, mut service: Service) -> Service {
        self.stamp_new(&mut service.metadata);
        self.allocate_service_fields(&mut service);
        let (namespace, name) = (
            service.metadata.namespace.clone().unwrap_or_default(),
            service.metadata.name.clone().unwrap_or_default(),
        );
        self.services.lock().unwrap().insert(key(&namespace, &name), service.clone());
        service
    }

    /// Mutate a stored AppService the way a user edit would (bumps resourceVersion)
    pub fn edit_app_service(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut AppService)) {
        let version = self.next_id().to_string();
        if let Some(app) = self.app_services.lock().unwrap().get_mut(&key(namespace, name)) {
            edit(app);
            app.metadata.resource_version = Some(version);
            app.metadata.generation = Some(app.metadata.generation.unwrap_or(0) + 1);
        }
    }

    /// Mutate a stored Service the way another writer would (bumps resourceVersion)
    pub fn edit_service(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Service)) {
        let version = self.next_id().to_string();
        if let Some(service) = self.services.lock().unwrap().get_mut(&key(namespace, name)) {
            edit(service);
            service.metadata.resource_version = Some(version);
        }
    }

    /// Remove a Deployment as if it had been deleted out of band
    pub fn remove_deployment(&self, namespace: &str, name: &str) {
        self.deployments.lock().unwrap().remove(&key(namespace, name));
    }

    /// Remove a Service as if it had been deleted out of band
    pub fn remove_service(&self, namespace: &str, name: &str) {
        self.services.lock().unwrap().remove(&key(namespace, name));
    }

    /// Make the next `op` on `kind` fail with `StoreError::Unavailable`
    pub fn fail_next(&self, op: Operation, kind: ResourceKind, message: impl Into<String>) {
        self.failures
            .lock()
            .unwrap()
            .entry((op, kind))
            .or_default()
            .push_back(InjectedFailure::Unavailable(message.into()));
    }

    /// Make the next update of `kind` fail with a conflict, as if another
    /// writer got there first. The stored object's resourceVersion is bumped.
    pub fn conflict_next_update(&self, kind: ResourceKind) {
        self.failures
            .lock()
            .unwrap()
            .entry((Operation::Update, kind))
            .or_default()
            .push_back(InjectedFailure::Conflict);
    }

    // Assertions

    pub fn app_service(&self, namespace: &str, name: &str) -> Option<AppService> {
        self.app_services.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.deployments.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// All successful writes, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of successful `op` calls on `kind`
    pub fn count(&self, op: Operation, kind: ResourceKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    /// Number of successful creates and updates of any kind
    pub fn write_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Forget recorded calls (stored objects are kept)
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl StoreClientTrait for MockStoreClient {
    async fn get_app_service(&self, namespace: &str, name: &str) -> Result<AppService, StoreError> {
        self.take_failure(Operation::Get, ResourceKind::AppService, namespace, name)?;
        self.app_service(namespace, name)
            .ok_or_else(|| Self::not_found(ResourceKind::AppService, namespace, name))
    }

    async fn update_app_service(&self, app: &AppService) -> Result<AppService, StoreError> {
        let kind = ResourceKind::AppService;
        let (k, namespace, name) = meta_key(&app.metadata, kind)?;
        if let Err(e) = self.take_failure(Operation::Update, kind, &namespace, &name) {
            if e.is_conflict() {
                self.edit_app_service(&namespace, &name, |_| {});
            }
            return Err(e);
        }
        let version = self.next_id().to_string();
        let mut store = self.app_services.lock().unwrap();
        let stored = store.get(&k).ok_or_else(|| Self::not_found(kind, &namespace, &name))?;
        Self::check_version(&stored.metadata, &app.metadata, kind, &namespace, &name)?;
        let mut updated = app.clone();
        updated.metadata.resource_version = Some(version);
        store.insert(k.clone(), updated.clone());
        drop(store);
        self.record(Operation::Update, kind, k);
        Ok(updated)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        self.take_failure(Operation::Get, ResourceKind::Deployment, namespace, name)?;
        self.deployment(namespace, name)
            .ok_or_else(|| Self::not_found(ResourceKind::Deployment, namespace, name))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let kind = ResourceKind::Deployment;
        let (k, namespace, name) = meta_key(&deployment.metadata, kind)?;
        self.take_failure(Operation::Create, kind, &namespace, &name)?;
        if self.deployments.lock().unwrap().contains_key(&k) {
            return Err(Self::already_exists(kind, &namespace, &name));
        }
        let created = self.add_deployment(deployment.clone());
        self.record(Operation::Create, kind, k);
        Ok(created)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let kind = ResourceKind::Deployment;
        let (k, namespace, name) = meta_key(&deployment.metadata, kind)?;
        if let Err(e) = self.take_failure(Operation::Update, kind, &namespace, &name) {
            if e.is_conflict() {
                let version = self.next_id().to_string();
                if let Some(stored) = self.deployments.lock().unwrap().get_mut(&k) {
                    stored.metadata.resource_version = Some(version);
                }
            }
            return Err(e);
        }
        let version = self.next_id().to_string();
        let mut store = self.deployments.lock().unwrap();
        let stored = store.get(&k).ok_or_else(|| Self::not_found(kind, &namespace, &name))?;
        Self::check_version(&stored.metadata, &deployment.metadata, kind, &namespace, &name)?;
        let mut updated = deployment.clone();
        updated.metadata.resource_version = Some(version);
        updated.metadata.generation = Some(stored.metadata.generation.unwrap_or(0) + 1);
        store.insert(k.clone(), updated.clone());
        drop(store);
        self.record(Operation::Update, kind, k);
        Ok(updated)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        self.take_failure(Operation::Get, ResourceKind::Service, namespace, name)?;
        self.service(namespace, name)
            .ok_or_else(|| Self::not_found(ResourceKind::Service, namespace, name))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        let kind = ResourceKind::Service;
        let (k, namespace, name) = meta_key(&service.metadata, kind)?;
        self.take_failure(Operation::Create, kind, &namespace, &name)?;
        if self.services.lock().unwrap().contains_key(&k) {
            return Err(Self::already_exists(kind, &namespace, &name));
        }
        let created = self.add_service(service.clone());
        self.record(Operation::Create, kind, k);
        Ok(created)
    }

    async fn update_service(&self, service: &Service) -> Result<Service, StoreError> {
        let kind = ResourceKind::Service;
        let (k, namespace, name) = meta_key(&service.metadata, kind)?;
        if let Err(e) = self.take_failure(Operation::Update, kind, &namespace, &name) {
            if e.is_conflict() {
                self.edit_service(&namespace, &name, |_| {});
            }
            return Err(e);
        }
        {
            let store = self.services.lock().unwrap();
            let stored = store.get(&k).ok_or_else(|| Self::not_found(kind, &namespace, &name))?;
            Self::check_version(&stored.metadata, &service.metadata, kind, &namespace, &name)?;
        }
        let mut updated = service.clone();
        updated.metadata.resource_version = Some(self.next_id().to_string());
        self.allocate_service_fields(&mut updated);
        self.services.lock().unwrap().insert(k.clone(), updated.clone());
        self.record(Operation::Update, kind, k);
        Ok(updated)
    }
}
