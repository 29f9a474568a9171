//! Controller-specific error types.
//!
//! This module defines error types specific to the AppService Controller
//! that are not covered by upstream library errors.

use crate::reconciler::spec_tracker::DecodeError;
use store_client::StoreError;
use thiserror::Error;

/// Errors that can occur in the AppService Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Get/create/update against the API server failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Last-applied spec annotation could not be read back
    #[error("Fingerprint decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Last-applied spec could not be serialized
    #[error("Fingerprint encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Invalid configuration or malformed object
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

