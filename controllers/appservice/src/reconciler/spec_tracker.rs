//! Last-applied spec tracking
//!
//! The spec that was in effect the last time convergence finished is stored as
//! JSON under the `spec` annotation of the AppService itself. Comparing it with
//! the current spec is how drift is detected without re-reading and diffing
//! every managed object.
//!
//! Only the `spec` key is read or written; other annotations are left alone.

use crate::error::ControllerError;
use crds::{AppService, AppServiceSpec};
use thiserror::Error;

/// Annotation key holding the serialized last-applied spec
pub const SPEC_ANNOTATION: &str = "spec";

/// Reasons the last-applied spec cannot be recovered
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The object never completed a convergence
    #[error("annotation \"spec\" is missing")]
    Missing,

    /// The annotation exists but is not a valid AppService spec
    #[error("annotation \"spec\" is malformed: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

/// The spec recorded after the last successful convergence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAppliedSpec(AppServiceSpec);

impl LastAppliedSpec {
    pub fn new(spec: AppServiceSpec) -> Self {
        Self(spec)
    }

    pub fn spec(&self) -> &AppServiceSpec {
        &self.0
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(raw)
            .map(Self)
            .map_err(|source| DecodeError::Malformed { source })
    }

    /// Field-by-field equality with the current spec (derived `PartialEq`).
    pub fn matches(&self, current: &AppServiceSpec) -> bool {
        self.0 == *current
    }
}

/// Write `spec` into the object's `spec` annotation.
///
/// Only the in-memory object changes; persisting it is up to the caller.
pub fn record(app: &mut AppService, spec: &AppServiceSpec) -> Result<(), ControllerError> {
    let encoded = LastAppliedSpec::new(spec.clone())
        .encode()
        .map_err(ControllerError::Encode)?;
    app.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(SPEC_ANNOTATION.to_string(), encoded);
    Ok(())
}

/// Read the last-applied spec back from the object.
pub fn recall(app: &AppService) -> Result<LastAppliedSpec, DecodeError> {
    let raw = app
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(SPEC_ANNOTATION))
        .ok_or(DecodeError::Missing)?;
    LastAppliedSpec::decode(raw)
}

/// True when the stored annotation already equals `spec`, so no write is needed.
pub fn is_recorded(app: &AppService, spec: &AppServiceSpec) -> bool {
    matches!(recall(app), Ok(last) if last.matches(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app_service, nginx_spec};

    #[test]
    fn test_record_then_recall() {
        let spec = nginx_spec();
        let mut app = create_test_app_service("web", "default", spec.clone());
        record(&mut app, &spec).unwrap();

        let last = recall(&app).unwrap();
        assert!(last.matches(&spec));
        assert_eq!(last.spec(), &spec);
        assert!(is_recorded(&app, &spec));
    }

    #[test]
    fn test_record_preserves_other_annotations() {
        let spec = nginx_spec();
        let mut app = create_test_app_service("web", "default", spec.clone());
        app.metadata.annotations = Some(
            [("owner".to_string(), "team-a".to_string())].into(),
        );
        record(&mut app, &spec).unwrap();

        let annotations = app.metadata.annotations.unwrap();
        assert_eq!(annotations.get("owner").map(String::as_str), Some("team-a"));
        assert!(annotations.contains_key(SPEC_ANNOTATION));
    }

    #[test]
    fn test_record_overwrites_previous_fingerprint() {
        let spec = nginx_spec();
        let mut app = create_test_app_service("web", "default", spec.clone());
        record(&mut app, &spec).unwrap();

        let mut scaled = spec.clone();
        scaled.replicas = 3;
        record(&mut app, &scaled).unwrap();
        assert!(recall(&app).unwrap().matches(&scaled));
        assert!(!is_recorded(&app, &spec));
    }

    #[test]
    fn test_recall_missing() {
        let app = create_test_app_service("web", "default", nginx_spec());
        assert!(matches!(recall(&app), Err(DecodeError::Missing)));
    }

    #[test]
    fn test_recall_malformed() {
        let mut app = create_test_app_service("web", "default", nginx_spec());
        app.metadata.annotations = Some(
            [(SPEC_ANNOTATION.to_string(), "{not json".to_string())].into(),
        );
        assert!(matches!(recall(&app), Err(DecodeError::Malformed { .. })));
        assert!(!is_recorded(&app, &nginx_spec()));
    }

    #[test]
    fn test_any_field_difference_is_drift() {
        let spec = nginx_spec();
        let last = LastAppliedSpec::new(spec.clone());

        let mut other = spec.clone();
        other.command = vec!["nginx".to_string(), "-g".to_string(), "daemon off;".to_string()];
        assert!(!last.matches(&other));

        let mut other = spec.clone();
        other.service_port = Some(8080);
        assert!(!last.matches(&other));
    }

    #[test]
    fn test_encoding_is_stable() {
        let last = LastAppliedSpec::new(nginx_spec());
        assert_eq!(last.encode().unwrap(), last.encode().unwrap());
        assert_eq!(
            last.encode().unwrap(),
            r#"{"image":"nginx:1.18","replicas":2,"containerPort":80,"serviceType":"NodePort"}"#
        );
    }
}
