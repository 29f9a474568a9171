//! Test utilities for unit testing reconcilers
//!
//! Builders for AppService objects and a harness wiring a `Reconciler` to a
//! `MockStoreClient` that the test keeps a handle on.

use crate::reconciler::conflict::ConflictRetry;
use crate::reconciler::Reconciler;
use crds::{AppService, AppServiceSpec, ExposureType};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use store_client::MockStoreClient;

/// Helper to create a test AppService (no uid, no annotations)
pub fn create_test_app_service(name: &str, namespace: &str, spec: AppServiceSpec) -> AppService {
    AppService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec,
    }
}

/// `{image: "nginx:1.18", replicas: 2, containerPort: 80}` exposed as NodePort
pub fn nginx_spec() -> AppServiceSpec {
    AppServiceSpec {
        image: "nginx:1.18".to_string(),
        replicas: 2,
        container_port: 80,
        service_port: None,
        service_type: ExposureType::NodePort,
        command: Vec::new(),
        envs: Vec::new(),
    }
}

/// Reconciler backed by a fresh mock store; the returned store shares state with it
pub fn create_test_reconciler() -> (Reconciler, MockStoreClient) {
    let store = MockStoreClient::new();
    let reconciler = Reconciler::new(store.clone(), ConflictRetry::default());
    (reconciler, store)
}
