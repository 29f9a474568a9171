//! Deployment comparison
//!
//! The API server fills in many defaults on a stored Deployment (strategy,
//! pull policy, termination settings and so on), so the live object never
//! equals the synthesized one outright. Only the fields the operator sets are
//! compared here.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar};

fn port_matches(live: &ContainerPort, desired: &ContainerPort) -> bool {
    live.name == desired.name
        && live.container_port == desired.container_port
        && live.protocol.as_deref().unwrap_or("TCP") == desired.protocol.as_deref().unwrap_or("TCP")
}

fn env_matches(live: &EnvVar, desired: &EnvVar) -> bool {
    live.name == desired.name && live.value.as_deref().unwrap_or("") == desired.value.as_deref().unwrap_or("")
}

fn all_match<T>(live: Option<&Vec<T>>, desired: Option<&Vec<T>>, eq: impl Fn(&T, &T) -> bool) -> bool {
    let live = live.map(Vec::as_slice).unwrap_or(&[]);
    let desired = desired.map(Vec::as_slice).unwrap_or(&[]);
    live.len() == desired.len() && live.iter().zip(desired).all(|(l, d)| eq(l, d))
}

fn container_matches(live: &Container, desired: &Container) -> bool {
    live.name == desired.name
        && live.image == desired.image
        && all_match(live.command.as_ref(), desired.command.as_ref(), |l, d| l == d)
        && all_match(live.ports.as_ref(), desired.ports.as_ref(), port_matches)
        && all_match(live.env.as_ref(), desired.env.as_ref(), env_matches)
}

fn spec_matches(live: &DeploymentSpec, desired: &DeploymentSpec) -> bool {
    let live_pod = live.template.spec.as_ref();
    let desired_pod = desired.template.spec.as_ref();
    let labels = |spec: &DeploymentSpec| spec.template.metadata.as_ref().and_then(|m| m.labels.clone());

    live.replicas.unwrap_or(1) == desired.replicas.unwrap_or(1)
        && live.selector.match_labels == desired.selector.match_labels
        && labels(live) == labels(desired)
        && all_match(
            live_pod.map(|p| &p.containers),
            desired_pod.map(|p| &p.containers),
            container_matches,
        )
}

/// True when every field the operator sets on `desired` already holds on `live`.
pub fn owned_fields_match(live: &Deployment, desired: &Deployment) -> bool {
    match (live.spec.as_ref(), desired.spec.as_ref()) {
        (Some(live), Some(desired)) => spec_matches(live, desired),
        (None, None) => true,
        _ => false,
    }
}
