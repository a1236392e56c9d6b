//! Outcome of teardown operations
//!
//! Teardown never stops at the first failure; each step is recorded here instead.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of a teardown run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Steps that completed
    pub succeeded: Vec<StepResult>,

    /// Steps that failed and were skipped over
    pub failed: Vec<StepResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, step: impl Into<String>, resource_id: impl Into<String>) {
        self.succeeded.push(StepResult {
            step: step.into(),
            resource_id: resource_id.into(),
            error: None,
        });
    }

    pub fn add_failure(
        &mut self,
        step: impl Into<String>,
        resource_id: impl Into<String>,
        error: impl ToString,
    ) {
        self.failed.push(StepResult {
            step: step.into(),
            resource_id: resource_id.into(),
            error: Some(error.to_string()),
        });
    }

    /// Fold a sub-report into this one
    pub fn absorb(&mut self, other: TeardownReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    pub fn finish(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }

    /// Successful steps of one kind, e.g. "delete-peering"
    pub fn succeeded_steps(&self, step: &str) -> Vec<&str> {
        self.succeeded
            .iter()
            .filter(|r| r.step == step)
            .map(|r| r.resource_id.as_str())
            .collect()
    }
}

/// A single teardown step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Kind of step (e.g. "terminate-instance")
    pub step: String,

    /// Provider id of the resource
    pub resource_id: String,

    /// Error message if failed
    pub error: Option<String>,
}

impl std::fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} removed, {} failed ({} ms)",
            self.succeeded.len(),
            self.failed.len(),
            self.duration_ms
        )
    }
}
