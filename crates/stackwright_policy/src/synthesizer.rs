//! Derives least-privilege grants from declared flow intents.
//!
//! For an intent `producer -> consumer` the synthesizer emits:
//!
//! - with a role: an [`GrantKind::Identity`] grant on the role carrying the
//!   minimal actions on the consumer, scoped to the consumer's ARN (and its
//!   contents for hierarchical kinds), plus a [`GrantKind::Trust`] grant
//!   letting the producer's service assume the role, restricted to the
//!   producer as source;
//! - without a role: a [`GrantKind::ResourceBased`] grant on the consumer
//!   admitting the producer's service, restricted the same way. Such a grant
//!   is implicitly about its subject and carries no resource patterns.
//!
//! Grants that land on the same subject with the same shape are merged, and
//! the output is sorted.

use crate::actions::{actions_for, wildcard_suffix, ASSUME_ROLE};
use crate::error::{PolicyError, PolicyResult};
use crate::grant::{GrantCondition, GrantKind, PermissionGrant, ResourcePattern};
use crate::intent::FlowIntent;
use indexmap::IndexMap;
use stackwright_core::{LogicalId, ResourceKind};

/// Permission synthesizer
pub struct PermissionSynthesizer<'a> {
    /// Kind of every declared resource
    kinds: &'a IndexMap<LogicalId, ResourceKind>,
}

impl<'a> PermissionSynthesizer<'a> {
    /// Create a synthesizer over the declared resources
    #[must_use]
    pub fn new(kinds: &'a IndexMap<LogicalId, ResourceKind>) -> Self {
        Self { kinds }
    }

    /// Synthesize grants for all intents
    ///
    /// # Errors
    ///
    /// Returns error if an intent references an undeclared resource, names a
    /// non-role as its role, or asks for a flow the consumer kind cannot
    /// receive
    pub fn synthesize(&self, intents: &[FlowIntent]) -> PolicyResult<Vec<PermissionGrant>> {
        let mut merged: Vec<PermissionGrant> = Vec::new();

        for intent in intents {
            for grant in self.grants_for(intent)? {
                match merged.iter_mut().find(|g| g.merge_key() == grant.merge_key()) {
                    Some(existing) => existing.merge(grant),
                    None => merged.push(grant),
                }
            }
        }

        merged.sort();
        Ok(merged)
    }

    /// Grants for a single intent
    fn grants_for(&self, intent: &FlowIntent) -> PolicyResult<Vec<PermissionGrant>> {
        let producer_kind = self.kind_of(intent, &intent.producer)?;
        let consumer_kind = self.kind_of(intent, &intent.consumer)?;

        let actions = actions_for(consumer_kind, intent.access);
        if actions.is_empty() {
            return Err(PolicyError::UnsupportedFlow {
                consumer: intent.consumer.clone(),
                kind: consumer_kind,
                access: intent.access,
            });
        }

        let principal = producer_kind.service_principal();
        let condition = GrantCondition::source_arn(intent.producer.clone());

        let Some(role) = &intent.role else {
            let grant = PermissionGrant::new(
                intent.consumer.clone(),
                intent.consumer.clone(),
                GrantKind::ResourceBased,
            )
            .with_actions(actions.iter().copied())
            .with_principal(principal)
            .with_condition(condition);
            return Ok(vec![grant]);
        };

        let role_kind = self.kind_of(intent, role)?;
        if role_kind != ResourceKind::Role {
            return Err(PolicyError::NotARole {
                id: role.clone(),
                kind: role_kind,
            });
        }

        let mut identity =
            PermissionGrant::new(role.clone(), intent.consumer.clone(), GrantKind::Identity)
                .with_actions(actions.iter().copied())
                .with_pattern(ResourcePattern::exact(intent.consumer.clone()));
        if let Some(suffix) = wildcard_suffix(consumer_kind) {
            identity = identity.with_pattern(ResourcePattern::contained(intent.consumer.clone(), suffix));
        }

        let trust = PermissionGrant::new(role.clone(), role.clone(), GrantKind::Trust)
            .with_actions([ASSUME_ROLE])
            .with_principal(principal)
            .with_condition(condition);

        Ok(vec![identity, trust])
    }

    /// Look up a resource kind, failing on undeclared IDs
    fn kind_of(&self, intent: &FlowIntent, id: &LogicalId) -> PolicyResult<ResourceKind> {
        self.kinds
            .get(id)
            .copied()
            .ok_or_else(|| PolicyError::UnknownResource {
                producer: intent.producer.clone(),
                consumer: intent.consumer.clone(),
                missing: id.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Access;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn kinds() -> IndexMap<LogicalId, ResourceKind> {
        let mut kinds = IndexMap::new();
        kinds.insert(id("Logs"), ResourceKind::LogSink);
        kinds.insert(id("Bucket"), ResourceKind::StorageBucket);
        kinds.insert(id("Stream"), ResourceKind::DeliveryStream);
        kinds.insert(id("DeliveryRole"), ResourceKind::Role);
        kinds.insert(id("Filter"), ResourceKind::EventFilter);
        kinds.insert(id("Handler"), ResourceKind::ComputeFunction);
        kinds
    }

    #[test]
    fn test_role_flow_emits_identity_and_trust() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let intent = FlowIntent::writes(id("Stream"), id("Bucket")).via_role(id("DeliveryRole"));

        let grants = synth.synthesize(&[intent]).unwrap();
        assert_eq!(grants.len(), 2);

        let identity = grants.iter().find(|g| g.kind == GrantKind::Identity).unwrap();
        assert_eq!(identity.subject, id("DeliveryRole"));
        assert_eq!(identity.resource, id("Bucket"));
        assert!(identity.actions.contains("s3:PutObject"));
        assert!(identity.patterns.contains(&ResourcePattern::contained(id("Bucket"), "/*")));
        assert!(identity.condition.is_none());

        let trust = grants.iter().find(|g| g.kind == GrantKind::Trust).unwrap();
        assert_eq!(trust.principal.as_deref(), Some("firehose.amazonaws.com"));
        assert_eq!(trust.condition, Some(GrantCondition::source_arn(id("Stream"))));
        assert!(trust.patterns.is_empty());
    }

    #[test]
    fn test_roleless_flow_is_resource_based() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let grants = synth
            .synthesize(&[FlowIntent::invokes(id("Logs"), id("Handler"))])
            .unwrap();

        assert_eq!(grants.len(), 1);
        let grant = &grants[0];
        assert_eq!(grant.kind, GrantKind::ResourceBased);
        assert_eq!(grant.subject, id("Handler"));
        assert_eq!(grant.principal.as_deref(), Some("logs.amazonaws.com"));
        assert_eq!(grant.actions.iter().collect::<Vec<_>>(), vec!["lambda:InvokeFunction"]);
        assert!(grant.patterns.is_empty());
    }

    #[test]
    fn test_non_hierarchical_target_has_single_pattern() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let intent = FlowIntent::writes(id("Logs"), id("Stream")).via_role(id("DeliveryRole"));
        let grants = synth.synthesize(&[intent]).unwrap();
        let identity = grants.iter().find(|g| g.kind == GrantKind::Identity).unwrap();
        assert_eq!(identity.patterns.len(), 1);
    }

    #[test]
    fn test_same_role_grants_merge() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let intents = vec![
            FlowIntent::writes(id("Stream"), id("Bucket")).via_role(id("DeliveryRole")),
            FlowIntent::writes(id("Stream"), id("Bucket"))
                .with_access(Access::Read)
                .via_role(id("DeliveryRole")),
        ];
        let grants = synth.synthesize(&intents).unwrap();
        assert_eq!(grants.len(), 2);
        let identity = grants.iter().find(|g| g.kind == GrantKind::Identity).unwrap();
        assert!(identity.actions.contains("s3:GetObject"));
        assert!(identity.actions.contains("s3:PutObject"));
    }

    #[test]
    fn test_unknown_resource() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let err = synth
            .synthesize(&[FlowIntent::writes(id("Stream"), id("Missing"))])
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownResource { ref missing, .. } if *missing == id("Missing")));
    }

    #[test]
    fn test_role_must_be_role() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let err = synth
            .synthesize(&[FlowIntent::writes(id("Stream"), id("Bucket")).via_role(id("Handler"))])
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotARole { .. }));
    }

    #[test]
    fn test_flow_into_filter_unsupported() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let err = synth
            .synthesize(&[FlowIntent::writes(id("Logs"), id("Filter"))])
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnsupportedFlow { .. }));
    }

    #[test]
    fn test_output_order_independent_of_intent_order() {
        let kinds = kinds();
        let synth = PermissionSynthesizer::new(&kinds);
        let a = FlowIntent::writes(id("Stream"), id("Bucket")).via_role(id("DeliveryRole"));
        let b = FlowIntent::invokes(id("Logs"), id("Handler"));
        let first = synth.synthesize(&[a.clone(), b.clone()]).unwrap();
        let second = synth.synthesize(&[b, a]).unwrap();
        assert_eq!(first, second);
    }
}
