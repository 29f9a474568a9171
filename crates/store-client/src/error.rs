//! Store client errors

use std::fmt;
use thiserror::Error;

/// Kinds of objects the operator reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AppService,
    Deployment,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::AppService => "AppService",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
        };
        f.write_str(s)
    }
}

/// Store operations, used for error mapping and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
        };
        f.write_str(s)
    }
}

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Update was rejected because the object changed since it was read
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Create was rejected because the object is already there
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    /// Object cannot be sent to the API (missing name, namespace, resourceVersion)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// API server failed to serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Translate a `kube::Error` into a typed store error.
    ///
    /// 404 maps to `NotFound`; 409 maps to `AlreadyExists` on create and to
    /// `Conflict` otherwise; 5xx maps to `Unavailable`.
    pub fn from_kube(
        err: kube::Error,
        op: Operation,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Self {
        let code = match &err {
            kube::Error::Api(resp) => Some(resp.code),
            _ => None,
        };
        match code {
            Some(404) => StoreError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Some(409) if op == Operation::Create => StoreError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Some(409) => StoreError::Conflict {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Some(code) if code >= 500 => {
                StoreError::Unavailable(format!("{} {} {}/{}: {}", op, kind, namespace, name, err))
            }
            _ => StoreError::Kube(err),
        }
    }
}

/// Turns a `NotFound` error into `Ok(None)`.
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for Result<T, StoreError> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
