//! StoreClient trait for mocking
//!
//! This trait abstracts the Kubernetes store to enable mocking in unit tests.
//! The concrete `StoreClient` implements this trait, and tests can use
//! `MockStoreClient`.

use crate::error::StoreError;
use crds::AppService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

/// Get/create/update operations for every kind the operator touches.
///
/// Updates are conditional: the object must carry the `resourceVersion` it was
/// read at, and a concurrent write makes the call fail with
/// `StoreError::Conflict`. All async methods must be `Send` to work with
/// Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait StoreClientTrait: Send + Sync {
    // AppService
    async fn get_app_service(&self, namespace: &str, name: &str) -> Result<AppService, StoreError>;
    async fn update_app_service(&self, app: &AppService) -> Result<AppService, StoreError>;

    // Deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, StoreError>;

    // Service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, StoreError>;
    async fn create_service(&self, service: &Service) -> Result<Service, StoreError>;
    async fn update_service(&self, service: &Service) -> Result<Service, StoreError>;
}
