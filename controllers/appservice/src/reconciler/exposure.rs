//! Field-scoped Service updates
//!
//! Only `type`, `ports` and `selector` of a live Service are owned by the
//! operator. Everything else, such as the cluster IP or node ports allocated by
//! the platform, stays as the API server reported it.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

const DEFAULT_SERVICE_TYPE: &str = "ClusterIP";

/// Which owned Service fields were rewritten
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExposureChanges {
    pub service_type: bool,
    pub ports: bool,
    pub selector: bool,
}

impl ExposureChanges {
    pub fn any(&self) -> bool {
        self.service_type || self.ports || self.selector
    }
}

fn service_type(spec: &ServiceSpec) -> &str {
    spec.type_.as_deref().unwrap_or(DEFAULT_SERVICE_TYPE)
}

fn uses_node_ports(service_type: &str) -> bool {
    matches!(service_type, "NodePort" | "LoadBalancer")
}

/// Compares the port fields the operator sets, ignoring allocated node ports.
fn port_matches(live: &ServicePort, desired: &ServicePort) -> bool {
    live.name == desired.name
        && live.port == desired.port
        && live.target_port == desired.target_port
        && live.protocol.as_deref().unwrap_or("TCP") == desired.protocol.as_deref().unwrap_or("TCP")
}

fn ports_match(live: &[ServicePort], desired: &[ServicePort]) -> bool {
    live.len() == desired.len() && live.iter().zip(desired).all(|(l, d)| port_matches(l, d))
}

/// Desired ports, keeping the node port the platform allocated for the port of
/// the same name (or number, for unnamed ports).
fn merge_ports(live: &[ServicePort], desired: &[ServicePort], keep_node_ports: bool) -> Vec<ServicePort> {
    desired
        .iter()
        .map(|want| {
            let mut port = want.clone();
            if keep_node_ports && port.node_port.is_none() {
                port.node_port = live
                    .iter()
                    .find(|have| match (&have.name, &want.name) {
                        (Some(a), Some(b)) => a == b,
                        _ => have.port == want.port,
                    })
                    .and_then(|have| have.node_port);
            }
            port
        })
        .collect()
}

/// Copy the owned fields that differ from `desired` into `live`.
///
/// Each of type, ports and selector is compared on its own. The returned value
/// says which were rewritten; when none were, `live` is untouched and no write
/// is needed.
pub fn apply_owned_fields(live: &mut Service, desired: &Service) -> ExposureChanges {
    let empty = ServiceSpec::default();
    let want = desired.spec.as_ref().unwrap_or(&empty);
    let have = live.spec.get_or_insert_with(Default::default);
    let mut changes = ExposureChanges::default();

    if service_type(have) != service_type(want) {
        have.type_ = want.type_.clone();
        changes.service_type = true;
    }

    let keep_node_ports = uses_node_ports(service_type(want));
    let live_ports = have.ports.as_deref().unwrap_or(&[]);
    let want_ports = want.ports.as_deref().unwrap_or(&[]);
    // Node ports must go when the type no longer allocates them
    let stale_node_ports = !keep_node_ports && live_ports.iter().any(|p| p.node_port.is_some());
    if !ports_match(live_ports, want_ports) || stale_node_ports {
        have.ports = Some(merge_ports(live_ports, want_ports, keep_node_ports));
        changes.ports = true;
    }

    if have.selector != want.selector {
        have.selector = want.selector.clone();
        changes.selector = true;
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::synthesizer::synthesize;
    use crate::test_utils::{create_test_app_service, nginx_spec};
    use crds::ExposureType;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    /// Desired Service plus a "live" copy carrying platform-assigned fields
    fn live_and_desired() -> (Service, Service) {
        let app = create_test_app_service("web", "default", nginx_spec());
        let desired = synthesize(&app).unwrap().exposure;
        let mut live = desired.clone();
        let spec = live.spec.as_mut().unwrap();
        spec.cluster_ip = Some("10.96.0.17".to_string());
        spec.ports.as_mut().unwrap()[0].node_port = Some(30080);
        live.metadata.resource_version = Some("42".to_string());
        (live, desired)
    }

    #[test]
    fn test_no_changes_when_owned_fields_match() {
        let (mut live, desired) = live_and_desired();
        let before = live.clone();
        let changes = apply_owned_fields(&mut live, &desired);
        assert!(!changes.any());
        assert_eq!(live, before);
    }

    #[test]
    fn test_port_change_keeps_platform_fields() {
        let (mut live, _) = live_and_desired();
        let mut spec = nginx_spec();
        spec.container_port = 8080;
        let desired = synthesize(&create_test_app_service("web", "default", spec)).unwrap().exposure;

        let changes = apply_owned_fields(&mut live, &desired);
        assert_eq!(
            changes,
            ExposureChanges { service_type: false, ports: true, selector: false }
        );
        let live_spec = live.spec.unwrap();
        assert_eq!(live_spec.cluster_ip.as_deref(), Some("10.96.0.17"));
        let port = &live_spec.ports.unwrap()[0];
        assert_eq!(port.port, 8080);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(port.node_port, Some(30080));
        assert_eq!(live.metadata.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_type_change_to_cluster_ip_drops_node_ports() {
        let (mut live, _) = live_and_desired();
        let mut spec = nginx_spec();
        spec.service_type = ExposureType::ClusterIp;
        let desired = synthesize(&create_test_app_service("web", "default", spec)).unwrap().exposure;

        let changes = apply_owned_fields(&mut live, &desired);
        assert!(changes.service_type);
        assert!(changes.ports);
        assert!(!changes.selector);
        let live_spec = live.spec.unwrap();
        assert_eq!(live_spec.type_.as_deref(), Some("ClusterIP"));
        assert!(live_spec.ports.unwrap()[0].node_port.is_none());
        assert_eq!(live_spec.cluster_ip.as_deref(), Some("10.96.0.17"));
    }

    #[test]
    fn test_selector_only_change() {
        let (mut live, desired) = live_and_desired();
        live.spec.as_mut().unwrap().selector =
            Some([("app".to_string(), "other".to_string())].into());

        let changes = apply_owned_fields(&mut live, &desired);
        assert_eq!(
            changes,
            ExposureChanges { service_type: false, ports: false, selector: true }
        );
        assert_eq!(live.spec.unwrap().selector, desired.spec.unwrap().selector);
    }

    #[test]
    fn test_missing_type_is_treated_as_cluster_ip() {
        let (mut live, _) = live_and_desired();
        let mut spec = nginx_spec();
        spec.service_type = ExposureType::ClusterIp;
        let desired = synthesize(&create_test_app_service("web", "default", spec)).unwrap().exposure;
        let live_spec = live.spec.as_mut().unwrap();
        live_spec.type_ = None;
        live_spec.ports.as_mut().unwrap()[0].node_port = None;

        assert!(!apply_owned_fields(&mut live, &desired).any());
    }
}
