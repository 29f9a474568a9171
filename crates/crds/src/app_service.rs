//! AppService CRD
//!
//! Declares an application: the image to run, how many replicas, and how the
//! workload is exposed inside or outside the cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "app.example.com",
    version = "v1",
    kind = "AppService",
    namespaced,
    shortname = "appsvc",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceSpec {
    /// Container image to run
    pub image: String,

    /// Desired number of workload replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Port the container listens on
    pub container_port: i32,

    /// Port exposed by the Service (defaults to `containerPort`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<i32>,

    /// How the workload is exposed
    #[serde(default)]
    pub service_type: ExposureType,

    /// Container entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Environment variables passed to the container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<EnvVarSpec>,
}

fn default_replicas() -> i32 {
    1
}

impl AppServiceSpec {
    /// The port the Service listens on.
    pub fn exposed_port(&self) -> i32 {
        self.service_port.unwrap_or(self.container_port)
    }
}

/// A plain name/value environment variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVarSpec {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Service exposure type
///
/// Serialized with the Kubernetes Service type names so the value can be
/// copied straight into `spec.type`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
pub enum ExposureType {
    /// Reachable only from inside the cluster
    #[serde(rename = "ClusterIP")]
    ClusterIp,

    /// Reachable on a port of every node
    #[default]
    NodePort,

    /// Reachable through an external load balancer
    LoadBalancer,
}

impl ExposureType {
    /// Kubernetes `Service.spec.type` value
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureType::ClusterIp => "ClusterIP",
            ExposureType::NodePort => "NodePort",
            ExposureType::LoadBalancer => "LoadBalancer",
        }
    }
}

impl std::fmt::Display for ExposureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: AppServiceSpec = serde_json::from_str(
            r#"{"image":"nginx:1.18","containerPort":80}"#,
        )
        .unwrap();
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.service_type, ExposureType::NodePort);
        assert_eq!(spec.exposed_port(), 80);
        assert!(spec.command.is_empty());
    }

    #[test]
    fn test_exposure_type_wire_names() {
        let json = serde_json::to_string(&ExposureType::ClusterIp).unwrap();
        assert_eq!(json, r#""ClusterIP""#);
        let parsed: ExposureType = serde_json::from_str(r#""LoadBalancer""#).unwrap();
        assert_eq!(parsed, ExposureType::LoadBalancer);
        assert_eq!(ExposureType::NodePort.to_string(), "NodePort");
    }

    #[test]
    fn test_spec_equality_is_structural() {
        let a = AppServiceSpec {
            image: "nginx:1.18".to_string(),
            replicas: 2,
            container_port: 80,
            service_port: None,
            service_type: ExposureType::NodePort,
            command: vec![],
            envs: vec![],
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.envs.push(EnvVarSpec { name: "MODE".to_string(), value: "prod".to_string() });
        assert_ne!(a, b);
    }
}
