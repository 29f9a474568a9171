//! AppService CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the AppService operator.

pub mod app_service;

pub use app_service::*;
