//! Cloud engine error types

use std::time::Duration;
use thiserror::Error;

/// Cloud engine errors
///
/// A query that finds nothing is not an error: lookups return `Ok(None)` or an empty
/// list. `ResourceNotFound` is reserved for callers that *require* the resource.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("{resource} '{id}' is in state '{state}', expected one of: {expected}")]
    UnexpectedState {
        resource: &'static str,
        id: String,
        state: String,
        expected: String,
    },

    #[error("API error: {0}")]
    Api(String),

    #[error("Remote command failed: {0}")]
    RemoteExec(String),

    #[error("Timeout after {waited:?} waiting for {what} (last observed: {last_observed})")]
    Timeout {
        what: String,
        waited: Duration,
        last_observed: String,
    },

    #[error("Expected exactly one {what}, found {count}")]
    Ambiguous { what: String, count: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether a readiness wait should absorb this error and poll again
    pub fn is_retryable_in_wait(&self) -> bool {
        matches!(self, CloudError::RemoteExec(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Enforce the "exactly one result" contract on a list query
pub fn exactly_one<T>(what: impl Into<String>, mut items: Vec<T>) -> Result<T> {
    if items.len() == 1 {
        if let Some(item) = items.pop() {
            return Ok(item);
        }
    }
    Err(CloudError::Ambiguous {
        what: what.into(),
        count: items.len(),
    })
}
