//! Policy synthesis errors.

use crate::intent::Access;
use stackwright_core::{LogicalId, ResourceKind};

/// Policy result type
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Error raised while deriving grants from intents
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// An intent names a resource that is not declared
    #[error("Intent {producer} -> {consumer} references unknown resource {missing}")]
    UnknownResource {
        /// Producer of the intent
        producer: LogicalId,
        /// Consumer of the intent
        consumer: LogicalId,
        /// The undeclared resource
        missing: LogicalId,
    },

    /// An intent's acting role is not a Role
    #[error("Resource {id} is a {kind}, not a Role")]
    NotARole {
        /// Offending resource
        id: LogicalId,
        /// Its actual kind
        kind: ResourceKind,
    },

    /// No action set exists for the flow
    #[error("No {access} actions exist for {kind} {consumer}")]
    UnsupportedFlow {
        /// Consumer of the flow
        consumer: LogicalId,
        /// Consumer kind
        kind: ResourceKind,
        /// Requested access
        access: Access,
    },

    /// A resource pattern is not a valid glob
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },
}

impl PolicyError {
    /// Logical IDs the error is about
    #[must_use]
    pub fn offending_ids(&self) -> Vec<LogicalId> {
        match self {
            Self::UnknownResource { missing, .. } => vec![missing.clone()],
            Self::NotARole { id, .. } => vec![id.clone()],
            Self::UnsupportedFlow { consumer, .. } => vec![consumer.clone()],
            Self::InvalidPattern { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_ids() {
        let err = PolicyError::NotARole {
            id: LogicalId::new("Bucket").unwrap(),
            kind: ResourceKind::StorageBucket,
        };
        assert_eq!(err.to_string(), "Resource Bucket is a StorageBucket, not a Role");
        assert_eq!(err.offending_ids(), vec![LogicalId::new("Bucket").unwrap()]);
    }
}
