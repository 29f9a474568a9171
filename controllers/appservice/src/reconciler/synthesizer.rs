//! Resource synthesis
//!
//! Maps an AppService to the Deployment and Service that should exist for it.
//! Synthesis is a pure function of the AppService: no clock, no randomness, and
//! ordered maps throughout, so identical input always gives identical output.
//! Drift handling relies on that.

use crate::error::ControllerError;
use crds::{AppService, AppServiceSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use std::collections::BTreeMap;

/// Label tying pods and the Service selector to their AppService
pub const APP_LABEL: &str = "app";
/// Name of the single container port and Service port
pub const PORT_NAME: &str = "http";
pub const PROTOCOL_TCP: &str = "TCP";

/// Everything the engine manages for one AppService
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedResources {
    pub workload: Deployment,
    pub exposure: Service,
}

/// Build the desired Deployment and Service for `app`.
///
/// Both objects share the AppService's namespace and name. A controller owner
/// reference is attached when the AppService has a UID, so the platform's
/// garbage collector removes them with it.
pub fn synthesize(app: &AppService) -> Result<ManagedResources, ControllerError> {
    let name = app
        .metadata
        .name
        .clone()
        .ok_or_else(|| ControllerError::InvalidConfig("AppService missing name".to_string()))?;
    let namespace = app.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());

    let metadata = ObjectMeta {
        name: Some(name.clone()),
        namespace: Some(namespace),
        labels: Some(selector_labels(&name)),
        owner_references: owner_references(app),
        ..Default::default()
    };

    Ok(ManagedResources {
        workload: Deployment {
            metadata: metadata.clone(),
            spec: Some(workload_spec(&name, &app.spec)),
            ..Default::default()
        },
        exposure: Service {
            metadata,
            spec: Some(exposure_spec(&name, &app.spec)),
            ..Default::default()
        },
    })
}

pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn owner_references(app: &AppService) -> Option<Vec<OwnerReference>> {
    app.controller_owner_ref(&()).map(|owner| vec![owner])
}

fn workload_spec(name: &str, spec: &AppServiceSpec) -> DeploymentSpec {
    let labels = selector_labels(name);

    let container = Container {
        name: name.to_string(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: spec.container_port,
            protocol: Some(PROTOCOL_TCP.to_string()),
            ..Default::default()
        }]),
        env: (!spec.envs.is_empty()).then(|| {
            spec.envs
                .iter()
                .map(|env| EnvVar {
                    name: env.name.clone(),
                    value: Some(env.value.clone()),
                    ..Default::default()
                })
                .collect()
        }),
        ..Default::default()
    };

    DeploymentSpec {
        replicas: Some(spec.replicas),
        selector: LabelSelector {
            match_labels: Some(labels.clone()),
            ..Default::default()
        },
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                ..Default::default()
            }),
        },
        ..Default::default()
    }
}

fn exposure_spec(name: &str, spec: &AppServiceSpec) -> ServiceSpec {
    ServiceSpec {
        type_: Some(spec.service_type.as_str().to_string()),
        ports: Some(vec![ServicePort {
            name: Some(PORT_NAME.to_string()),
            port: spec.exposed_port(),
            target_port: Some(IntOrString::Int(spec.container_port)),
            protocol: Some(PROTOCOL_TCP.to_string()),
            ..Default::default()
        }]),
        selector: Some(selector_labels(name)),
        ..Default::default()
    }
}
