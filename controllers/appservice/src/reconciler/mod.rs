//! Reconciliation logic for AppService resources.
//!
//! - `synthesizer`: desired Deployment and Service for an AppService
//! - `spec_tracker`: the last-applied spec kept in the `spec` annotation
//! - `exposure`: field-scoped Service updates
//! - `workload`: comparison of the Deployment fields the operator sets
//! - `conflict`: bounded retry on resourceVersion conflicts
//! - `engine`: the convergence state machine tying them together

pub mod conflict;
mod engine;
pub mod exposure;
pub mod spec_tracker;
pub mod synthesizer;
pub mod workload;


use crate::backoff::FibonacciBackoff;
use conflict::ConflictRetry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use store_client::StoreClientTrait;
use tracing::warn;

/// How a reconcile finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The AppService does not exist (deleted); nothing to do
    Absent,
    /// The AppService is being deleted; owned objects go with it
    Deleting,
    /// First convergence completed and the fingerprint was recorded
    Created,
    /// No drift and every managed resource present
    Unchanged,
    /// No drift, but a managed resource was missing and got recreated
    Repaired,
    /// Drift was found and the managed resources were brought in line
    Updated,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Absent => "absent",
            Outcome::Deleting => "deleting",
            Outcome::Created => "created",
            Outcome::Unchanged => "unchanged",
            Outcome::Repaired => "repaired",
            Outcome::Updated => "updated",
        };
        f.write_str(s)
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone, Default)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Reconciles AppService resources.
pub struct Reconciler {
    pub(crate) store: Box<dyn StoreClientTrait + Send + Sync>,
    pub(crate) conflict_retry: ConflictRetry,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    pub fn new(store: impl StoreClientTrait + 'static, conflict_retry: ConflictRetry) -> Self {
        Self {
            store: Box::new(store),
            conflict_retry,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get the Fibonacci backoff duration for a resource and advance it
    ///
    /// Returns (backoff_seconds, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_default();
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (crate::backoff::DEFAULT_MIN_SECONDS, 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.entry(resource_key.to_string()).or_default().increment_error();
        }
    }

    /// Forget a resource's backoff state (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
