//! Apply-time errors.
//!
//! Every variant carries the resources resolved before the run stopped.
//! Nothing is rolled back.

use crate::provider::ProviderError;
use crate::resolved::ResolvedMap;
use serde::{Deserialize, Serialize};
use stackwright_core::LogicalId;

/// Apply result type
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Why a single provider call sequence failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CallError {
    /// The provider reported a failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The call did not finish in time; the remote state is unknown
    #[error("timed out after {timeout_ms} ms, remote state unknown")]
    Timeout {
        /// Timeout that elapsed
        timeout_ms: u64,
    },
}

/// A resource that failed within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFailure {
    /// Failed resource
    pub id: LogicalId,
    /// Final error
    pub error: CallError,
    /// Calls made, retries included
    pub attempts: u32,
}

impl std::fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} attempts): {}", self.id, self.attempts, self.error)
    }
}

/// Error raised while applying a plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// At least one member of a batch failed; later batches never started
    #[error("Batch {batch_index} failed: {}", display_failures(.failures))]
    BatchFailure {
        /// Index of the failed batch
        batch_index: usize,
        /// Failed members, sorted by ID
        failures: Vec<ResourceFailure>,
        /// Resources resolved before and during the batch
        resolved: ResolvedMap,
    },

    /// The run was cancelled; in-flight calls were drained
    #[error("Apply cancelled with {} resources resolved", .resolved.len())]
    Cancelled {
        /// Resources resolved before cancellation took effect
        resolved: ResolvedMap,
    },

    /// The plan and the resolved state disagree
    #[error("Internal error{}: {reason}", display_id(.id))]
    Internal {
        /// Resource being processed, if known
        id: Option<LogicalId>,
        /// What went wrong
        reason: String,
        /// Resources resolved so far
        resolved: ResolvedMap,
    },
}

impl ApplyError {
    /// Resources resolved before the run stopped
    #[must_use]
    pub fn resolved(&self) -> &ResolvedMap {
        match self {
            Self::BatchFailure { resolved, .. }
            | Self::Cancelled { resolved }
            | Self::Internal { resolved, .. } => resolved,
        }
    }

    /// Take the partial map, e.g. to resume from it
    #[must_use]
    pub fn into_resolved(self) -> ResolvedMap {
        match self {
            Self::BatchFailure { resolved, .. }
            | Self::Cancelled { resolved }
            | Self::Internal { resolved, .. } => resolved,
        }
    }

    /// Logical IDs the error is about
    #[must_use]
    pub fn offending_ids(&self) -> Vec<LogicalId> {
        match self {
            Self::BatchFailure { failures, .. } => failures.iter().map(|f| f.id.clone()).collect(),
            Self::Cancelled { .. } => Vec::new(),
            Self::Internal { id, .. } => id.iter().cloned().collect(),
        }
    }
}

fn display_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn display_id(id: &Option<LogicalId>) -> String {
    id.as_ref().map(|id| format!(" at {}", id)).unwrap_or_default()
}
