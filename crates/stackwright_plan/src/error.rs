//! Build and plan time errors.
//!
//! All of these are fatal: no partial plan is ever produced.

use stackwright_core::{Attribute, CoreError, LogicalId, ResourceKind};
use stackwright_policy::PolicyError;

/// Plan result type
pub type PlanResult<T> = Result<T, PlanError>;

/// Error raised while building the dependency graph or the plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// References form a cycle
    #[error("Dependency cycle: {}", display_path(.cycle))]
    Cycle {
        /// Resources on the cycle, in edge order, starting at its entry point
        cycle: Vec<LogicalId>,
    },

    /// A resource references an undeclared resource
    #[error("Resource {resource} references unknown resource {target}")]
    UnresolvedReference {
        /// Referencing resource
        resource: LogicalId,
        /// Undeclared target
        target: LogicalId,
    },

    /// A dependency edge starts at a resource that was never declared
    #[error("Resource {id} has dependencies but was never declared")]
    UndeclaredResource {
        /// Undeclared source of the edge
        id: LogicalId,
    },

    /// Some resources could never be scheduled
    #[error("Unable to schedule resources: {}", display_list(.remaining))]
    Planning {
        /// Resources left without a zero in-degree
        remaining: Vec<LogicalId>,
    },

    /// Two resources share a logical ID
    #[error("Duplicate resource {id}")]
    DuplicateResource {
        /// Repeated ID
        id: LogicalId,
    },

    /// A reference asks for an identifier the target kind never has
    #[error("Resource {resource} references {attribute} of {target}, which a {kind} does not have")]
    UnsupportedAttribute {
        /// Referencing resource
        resource: LogicalId,
        /// Referenced resource
        target: LogicalId,
        /// Kind of the referenced resource
        kind: ResourceKind,
        /// Requested attribute
        attribute: Attribute,
    },

    /// A configuration property has an unusable shape
    #[error("Invalid property {property} on {id}: {reason}")]
    InvalidProperty {
        /// Resource holding the property
        id: LogicalId,
        /// Property name
        property: String,
        /// Why it was rejected
        reason: String,
    },

    /// Grant synthesis failed
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Invalid core value (environment, identifier)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PlanError {
    /// Logical IDs the error is about
    #[must_use]
    pub fn offending_ids(&self) -> Vec<LogicalId> {
        match self {
            Self::Cycle { cycle } => cycle.clone(),
            Self::UnresolvedReference { resource, target }
            | Self::UnsupportedAttribute { resource, target, .. } => {
                vec![resource.clone(), target.clone()]
            }
            Self::Planning { remaining } => remaining.clone(),
            Self::DuplicateResource { id }
            | Self::UndeclaredResource { id }
            | Self::InvalidProperty { id, .. } => vec![id.clone()],
            Self::Policy(e) => e.offending_ids(),
            Self::Core(_) => Vec::new(),
        }
    }
}

fn display_list(ids: &[LogicalId]) -> String {
    ids.iter().map(LogicalId::as_str).collect::<Vec<_>>().join(", ")
}

fn display_path(ids: &[LogicalId]) -> String {
    let mut parts: Vec<&str> = ids.iter().map(LogicalId::as_str).collect();
    if let Some(first) = ids.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    #[test]
    fn test_cycle_display_closes_loop() {
        let err = PlanError::Cycle {
            cycle: vec![id("A"), id("B")],
        };
        assert_eq!(err.to_string(), "Dependency cycle: A -> B -> A");
        assert_eq!(err.offending_ids(), vec![id("A"), id("B")]);
    }

    #[test]
    fn test_unresolved_reference_names_both_ids() {
        let err = PlanError::UnresolvedReference {
            resource: id("Role"),
            target: id("Missing"),
        };
        assert!(err.to_string().contains("Missing"));
        assert_eq!(err.offending_ids(), vec![id("Role"), id("Missing")]);
    }

    #[test]
    fn test_policy_error_converts() {
        let err: PlanError = PolicyError::NotARole {
            id: id("Bucket"),
            kind: ResourceKind::StorageBucket,
        }
        .into();
        assert_eq!(err.offending_ids(), vec![id("Bucket")]);
    }
}
