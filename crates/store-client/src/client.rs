//! Store client backed by the Kubernetes API server

use crate::error::{Operation, ResourceKind, StoreError};
use crate::store_trait::StoreClientTrait;
use crds::AppService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::PostParams;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "appservice-operator";

/// Kubernetes-backed implementation of `StoreClientTrait`.
#[derive(Clone)]
pub struct StoreClient {
    client: Client,
}

impl StoreClient {
    /// Wrap an existing Kubernetes client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster or kubeconfig environment.
    pub async fn try_default() -> Result<Self, StoreError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

/// Namespace and name of an object about to be written.
fn identity<K: Resource>(obj: &K, kind: ResourceKind) -> Result<(String, String), StoreError> {
    let meta = obj.meta();
    let name = meta
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{} is missing metadata.name", kind)))?;
    let namespace = meta.namespace.clone().ok_or_else(|| {
        StoreError::InvalidObject(format!("{} {} is missing metadata.namespace", kind, name))
    })?;
    Ok((namespace, name))
}

async fn get_object<K>(api: Api<K>, kind: ResourceKind, namespace: &str, name: &str) -> Result<K, StoreError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    debug!(%kind, namespace, name, "get");
    api.get(name)
        .await
        .map_err(|e| StoreError::from_kube(e, Operation::Get, kind, namespace, name))
}

async fn create_object<K>(api: Api<K>, kind: ResourceKind, obj: &K) -> Result<K, StoreError>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let (namespace, name) = identity(obj, kind)?;
    debug!(%kind, namespace = %namespace, name = %name, "create");
    api.create(&StoreClient::post_params(), obj)
        .await
        .map_err(|e| StoreError::from_kube(e, Operation::Create, kind, &namespace, &name))
}

async fn replace_object<K>(api: Api<K>, kind: ResourceKind, obj: &K) -> Result<K, StoreError>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
{
    let (namespace, name) = identity(obj, kind)?;
    // Without a resourceVersion the API server would apply the write blindly.
    if obj.meta().resource_version.is_none() {
        return Err(StoreError::InvalidObject(format!(
            "{} {}/{} is missing metadata.resourceVersion",
            kind, namespace, name
        )));
    }
    debug!(%kind, namespace = %namespace, name = %name, "replace");
    api.replace(&name, &StoreClient::post_params(), obj)
        .await
        .map_err(|e| StoreError::from_kube(e, Operation::Update, kind, &namespace, &name))
}

#[async_trait::async_trait]
impl StoreClientTrait for StoreClient {
    async fn get_app_service(&self, namespace: &str, name: &str) -> Result<AppService, StoreError> {
        get_object(self.api(namespace), ResourceKind::AppService, namespace, name).await
    }

    async fn update_app_service(&self, app: &AppService) -> Result<AppService, StoreError> {
        let (namespace, _) = identity(app, ResourceKind::AppService)?;
        replace_object(self.api(&namespace), ResourceKind::AppService, app).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        get_object(self.api(namespace), ResourceKind::Deployment, namespace, name).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let (namespace, _) = identity(deployment, ResourceKind::Deployment)?;
        create_object(self.api(&namespace), ResourceKind::Deployment, deployment).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError> {
        let (namespace, _) = identity(deployment, ResourceKind::Deployment)?;
        replace_object(self.api(&namespace), ResourceKind::Deployment, deployment).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        get_object(self.api(namespace), ResourceKind::Service, namespace, name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        let (namespace, _) = identity(service, ResourceKind::Service)?;
        create_object(self.api(&namespace), ResourceKind::Service, service).await
    }

    async fn update_service(&self, service: &Service) -> Result<Service, StoreError> {
        let (namespace, _) = identity(service, ResourceKind::Service)?;
        replace_object(self.api(&namespace), ResourceKind::Service, service).await
    }
}
