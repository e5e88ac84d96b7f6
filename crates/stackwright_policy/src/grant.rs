//! Permission grants produced by the synthesizer.

use serde::{Deserialize, Serialize};
use stackwright_core::LogicalId;
use std::collections::BTreeSet;

/// Where a grant is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Statement in the subject role's access policy
    Identity,
    /// Statement in the subject role's assume-role (trust) policy
    Trust,
    /// Statement in the subject resource's own resource policy
    ResourceBased,
}

/// Resource a grant applies to, by logical ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePattern {
    /// Resource whose ARN the pattern starts from
    pub target: LogicalId,
    /// Literal appended to the ARN (e.g. `/*` for bucket objects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl ResourcePattern {
    /// Pattern matching exactly the target
    #[must_use]
    pub fn exact(target: LogicalId) -> Self {
        Self { target, suffix: None }
    }

    /// Pattern matching what the target contains
    #[must_use]
    pub fn contained(target: LogicalId, suffix: &str) -> Self {
        Self {
            target,
            suffix: Some(suffix.to_string()),
        }
    }
}

/// Key/value restriction on a grant
///
/// The value is the ARN of `source`; the planner renders it either as the
/// exact ARN or, when that ARN is only known after apply, as a pattern
/// scoped to the source's service in the stack's account and region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantCondition {
    /// Condition key
    pub key: String,
    /// Resource whose ARN requests must originate from
    pub source: LogicalId,
}

/// Condition key restricting requests to an originating resource
pub const SOURCE_ARN_KEY: &str = "aws:SourceArn";

impl GrantCondition {
    /// Restrict to requests originating from `source`
    #[must_use]
    pub fn source_arn(source: LogicalId) -> Self {
        Self {
            key: SOURCE_ARN_KEY.to_string(),
            source,
        }
    }
}

/// A scoped permission attached to a subject resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Resource the grant is attached to (the role, or the consumer for
    /// resource-based grants)
    pub subject: LogicalId,
    /// Resource the grant is about
    pub resource: LogicalId,
    /// Where the grant lives
    pub kind: GrantKind,
    /// Action tokens, sorted
    pub actions: BTreeSet<String>,
    /// Resource patterns, sorted; empty for trust and resource-based grants
    pub patterns: BTreeSet<ResourcePattern>,
    /// Service principal allowed to act, for trust and resource-based grants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    /// Source restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<GrantCondition>,
}

impl PermissionGrant {
    /// Create a grant with no actions
    #[must_use]
    pub fn new(subject: LogicalId, resource: LogicalId, kind: GrantKind) -> Self {
        Self {
            subject,
            resource,
            kind,
            actions: BTreeSet::new(),
            patterns: BTreeSet::new(),
            principal: None,
            condition: None,
        }
    }

    /// Add actions
    #[must_use]
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Add a resource pattern
    #[must_use]
    pub fn with_pattern(mut self, pattern: ResourcePattern) -> Self {
        self.patterns.insert(pattern);
        self
    }

    /// Set the service principal
    #[must_use]
    pub fn with_principal(mut self, principal: String) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Set the source restriction
    #[must_use]
    pub fn with_condition(mut self, condition: GrantCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Key used to merge grants that differ only in actions and patterns
    #[must_use]
    pub fn merge_key(&self) -> (GrantKind, &LogicalId, &LogicalId, Option<&str>, Option<&GrantCondition>) {
        (
            self.kind,
            &self.subject,
            &self.resource,
            self.principal.as_deref(),
            self.condition.as_ref(),
        )
    }

    /// Fold another grant's actions and patterns into this one
    pub fn merge(&mut self, other: PermissionGrant) {
        self.actions.extend(other.actions);
        self.patterns.extend(other.patterns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    #[test]
    fn test_grant_builder() {
        let grant = PermissionGrant::new(id("Role"), id("Bucket"), GrantKind::Identity)
            .with_actions(["s3:PutObject", "s3:GetBucketLocation"])
            .with_pattern(ResourcePattern::exact(id("Bucket")))
            .with_pattern(ResourcePattern::contained(id("Bucket"), "/*"));

        assert_eq!(grant.actions.len(), 2);
        assert_eq!(grant.actions.iter().next().unwrap(), "s3:GetBucketLocation");
        assert_eq!(grant.patterns.len(), 2);
        assert!(grant.condition.is_none());
    }

    #[test]
    fn test_merge_unions_actions() {
        let mut a = PermissionGrant::new(id("Role"), id("Bucket"), GrantKind::Identity)
            .with_actions(["s3:PutObject"]);
        let b = PermissionGrant::new(id("Role"), id("Bucket"), GrantKind::Identity)
            .with_actions(["s3:GetObject", "s3:PutObject"]);
        assert_eq!(a.merge_key(), b.merge_key());
        a.merge(b);
        assert_eq!(a.actions.len(), 2);
    }

    #[test]
    fn test_source_arn_condition() {
        let cond = GrantCondition::source_arn(id("Logs"));
        assert_eq!(cond.key, "aws:SourceArn");
    }
}
