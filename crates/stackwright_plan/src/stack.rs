//! Stack declarations and the plan pipeline.
//!
//! A [`Stack`] is what a caller declares: one environment, the resources and
//! the data-flow intents between them. [`Stack::build_plan`] turns it into a
//! [`Plan`]:
//!
//! 1. validate the environment and logical IDs
//! 2. synthesize grants from intents and attach them to their subjects
//! 3. substitute predictable identifiers
//! 4. build and validate the dependency graph
//! 5. compute batches

use crate::dag::GraphBuilder;
use crate::error::{PlanError, PlanResult};
use crate::grants::attach_grants;
use crate::identifier::IdentifierResolver;
use crate::planner::{Plan, Planner};
use crate::resource::ResourceSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackwright_core::{CoreError, LogicalId, ResourceKind, StackEnv};
use stackwright_policy::{FlowIntent, PermissionSynthesizer, PolicyError};

/// A declared stack
///
/// Also the shape of a declaration file:
///
/// ```json
/// {
///   "env": {"partition": "aws", "account": "123456789012", "region": "eu-west-1"},
///   "resources": [{"id": "Bucket", "kind": "StorageBucket"}],
///   "intents": []
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Environment every identifier is rendered for
    #[serde(default)]
    pub env: StackEnv,
    /// Declared resources
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Declared data flows
    #[serde(default)]
    pub intents: Vec<FlowIntent>,
}

impl Stack {
    /// Create an empty stack
    #[must_use]
    pub fn new(env: StackEnv) -> Self {
        Self {
            env,
            resources: Vec::new(),
            intents: Vec::new(),
        }
    }

    /// Add a resource
    #[must_use]
    pub fn with_resource(mut self, spec: ResourceSpec) -> Self {
        self.resources.push(spec);
        self
    }

    /// Add several resources
    #[must_use]
    pub fn with_resources<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = ResourceSpec>,
    {
        self.resources.extend(specs);
        self
    }

    /// Add a data-flow intent
    #[must_use]
    pub fn with_intent(mut self, intent: FlowIntent) -> Self {
        self.intents.push(intent);
        self
    }

    /// Parse a JSON declaration
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid declaration
    pub fn from_json_str(text: &str) -> PlanResult<Self> {
        serde_json::from_str(text).map_err(|e| PlanError::Core(CoreError::from(e)))
    }

    /// Serialize the declaration as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json_string(&self) -> PlanResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlanError::Core(CoreError::from(e)))
    }

    /// Build the plan
    ///
    /// # Errors
    ///
    /// Returns the first build-time error: invalid environment, duplicate
    /// or unknown IDs, unsupported flows, unsupported attributes, cycles
    pub fn build_plan(&self) -> PlanResult<Plan> {
        self.env.validate()?;

        let mut specs: IndexMap<LogicalId, ResourceSpec> = IndexMap::with_capacity(self.resources.len());
        for spec in &self.resources {
            if specs.insert(spec.id.clone(), spec.clone()).is_some() {
                return Err(PlanError::DuplicateResource { id: spec.id.clone() });
            }
        }

        let kinds: IndexMap<LogicalId, ResourceKind> =
            specs.iter().map(|(id, spec)| (id.clone(), spec.kind)).collect();
        let grants = PermissionSynthesizer::new(&kinds)
            .synthesize(&self.intents)
            .map_err(|e| match e {
                PolicyError::UnknownResource { producer, missing, .. } => PlanError::UnresolvedReference {
                    resource: producer,
                    target: missing,
                },
                other => PlanError::Policy(other),
            })?;
        attach_grants(&self.env, &mut specs, &grants)?;

        let resolver = IdentifierResolver::new(&self.env, &specs);
        let resolved = specs
            .values()
            .map(|spec| resolver.resolve(spec).map(|r| (r.id.clone(), r)))
            .collect::<PlanResult<IndexMap<_, _>>>()?;

        let graph = GraphBuilder::from_specs(resolved.values())?.build()?;
        let plan = Planner::new().plan(self.env.clone(), resolved, graph)?;

        tracing::debug!(
            resources = plan.len(),
            batches = plan.batches().len(),
            grants = grants.len(),
            "built plan"
        );
        Ok(plan)
    }
}

/// Plan a set of specs in the default environment, with no intents
///
/// # Errors
///
/// Returns error on duplicate or unknown IDs, unsupported attributes or
/// cycles
pub fn build_plan<I>(specs: I) -> PlanResult<Plan>
where
    I: IntoIterator<Item = ResourceSpec>,
{
    Stack::default().with_resources(specs).build_plan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AttrRef, PropertyValue};
    use proptest::prelude::*;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn members(plan: &Plan) -> Vec<Vec<&str>> {
        plan.batches()
            .iter()
            .map(|b| b.members.iter().map(LogicalId::as_str).collect())
            .collect()
    }

    fn delivery_stack(bucket_named: bool, declared_ref: bool) -> Stack {
        let mut bucket = ResourceSpec::new(id("B"), ResourceKind::StorageBucket);
        if bucket_named {
            bucket = bucket.with_name("events");
        }
        let mut role = ResourceSpec::new(id("R"), ResourceKind::Role);
        if declared_ref {
            role = role.with_reference(id("B"));
        }
        let stream = ResourceSpec::new(id("S"), ResourceKind::DeliveryStream)
            .with_property("bucket_arn", AttrRef::arn(id("B")))
            .with_property("role_arn", AttrRef::arn(id("R")))
            .with_reference(id("B"))
            .with_reference(id("R"));

        Stack::default()
            .with_resources([bucket, role, stream])
            .with_intent(FlowIntent::writes(id("S"), id("B")).via_role(id("R")))
    }

    #[test]
    fn test_bucket_role_stream_batches() {
        let plan = delivery_stack(false, true).build_plan().unwrap();
        assert_eq!(members(&plan), vec![vec!["B"], vec!["R"], vec!["S"]]);
    }

    #[test]
    fn test_named_bucket_lets_role_share_first_batch() {
        let plan = delivery_stack(true, false).build_plan().unwrap();
        assert_eq!(members(&plan), vec![vec!["B", "R"], vec!["S"]]);

        let role = plan.spec(&id("R")).unwrap();
        assert!(role.property_refs().is_empty());
    }

    #[test]
    fn test_unnamed_bucket_orders_role_after_it() {
        let plan = delivery_stack(false, false).build_plan().unwrap();
        assert_eq!(members(&plan), vec![vec!["B"], vec!["R"], vec!["S"]]);
        assert!(plan.dependencies(&id("R")).unwrap().contains(&id("B")));
    }

    #[test]
    fn test_cycle_rejected() {
        let a = ResourceSpec::new(id("A"), ResourceKind::Role).with_reference(id("B"));
        let b = ResourceSpec::new(id("B"), ResourceKind::Role).with_reference(id("A"));
        let err = build_plan([a, b]).unwrap_err();
        assert_eq!(err, PlanError::Cycle { cycle: vec![id("A"), id("B")] });
    }

    #[test]
    fn test_duplicate_rejected() {
        let a = ResourceSpec::new(id("A"), ResourceKind::Role);
        let err = build_plan([a.clone(), a]).unwrap_err();
        assert_eq!(err, PlanError::DuplicateResource { id: id("A") });
    }

    #[test]
    fn test_intent_with_unknown_resource() {
        let stack = Stack::default()
            .with_resource(ResourceSpec::new(id("S"), ResourceKind::DeliveryStream))
            .with_intent(FlowIntent::writes(id("S"), id("Nowhere")));
        let err = stack.build_plan().unwrap_err();
        assert_eq!(
            err,
            PlanError::UnresolvedReference {
                resource: id("S"),
                target: id("Nowhere"),
            }
        );
    }

    #[test]
    fn test_invalid_env_rejected() {
        let mut stack = Stack::default();
        stack.env.account = "12".to_string();
        assert!(matches!(stack.build_plan(), Err(PlanError::Core(_))));
    }

    #[test]
    fn test_ref_to_filter_arn_rejected() {
        let filter = ResourceSpec::new(id("F"), ResourceKind::EventFilter);
        let role = ResourceSpec::new(id("R"), ResourceKind::Role).with_property("f", AttrRef::arn(id("F")));
        let err = build_plan([filter, role]).unwrap_err();
        assert!(matches!(err, PlanError::UnsupportedAttribute { .. }));
    }

    #[test]
    fn test_declaration_json() {
        let text = r#"{
            "env": {"account": "123456789012", "region": "eu-west-1"},
            "resources": [
                {"id": "Bucket", "kind": "StorageBucket", "properties": {"bucket_name": "archive"}},
                {"id": "Role", "kind": "Role"},
                {"id": "Stream", "kind": "DeliveryStream",
                 "properties": {"bucket_arn": {"ref": "Bucket"}, "role_arn": {"ref": "Role"}}}
            ],
            "intents": [{"producer": "Stream", "consumer": "Bucket", "access": "write", "role": "Role"}]
        }"#;
        let stack = Stack::from_json_str(text).unwrap();
        assert_eq!(stack.env.partition, "aws");
        assert_eq!(stack.env.region, "eu-west-1");

        let plan = stack.build_plan().unwrap();
        assert_eq!(members(&plan), vec![vec!["Bucket", "Role"], vec!["Stream"]]);
        assert_eq!(
            plan.spec(&id("Stream")).unwrap().property("bucket_arn"),
            Some(&PropertyValue::String("arn:aws:s3:::archive".to_string()))
        );
    }

    #[test]
    fn test_malformed_declaration() {
        assert!(Stack::from_json_str("{\"resources\": 3}").is_err());
        assert!(Stack::from_json_str("{\"resources\": [{\"id\": \"\", \"kind\": \"Role\"}]}").is_err());
    }

    fn chain_stack(order: &[usize], named: &[bool]) -> Stack {
        // R{i} references the ARN of R{i-1}
        let specs = order.iter().map(|&i| {
            let mut spec = ResourceSpec::new(id(&format!("R{}", i)), ResourceKind::Role);
            if named[i] {
                spec = spec.with_name(format!("role-{}", i));
            }
            if i > 0 {
                spec = spec.with_property("prev", AttrRef::arn(id(&format!("R{}", i - 1))));
            }
            spec
        });
        Stack::default().with_resources(specs)
    }

    proptest! {
        #[test]
        fn prop_plan_deterministic_under_permutation(
            named in proptest::collection::vec(any::<bool>(), 1..8),
            seed in any::<u64>(),
        ) {
            let n = named.len();
            let forward: Vec<usize> = (0..n).collect();
            let mut shuffled = forward.clone();
            for i in (1..n).rev() {
                let j = (seed.rotate_left(i as u32) % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }

            let a = chain_stack(&forward, &named).build_plan().unwrap();
            let b = chain_stack(&shuffled, &named).build_plan().unwrap();
            prop_assert_eq!(a.batches(), b.batches());
        }

        #[test]
        fn prop_assigned_refs_become_edges(named in proptest::collection::vec(any::<bool>(), 2..8)) {
            let order: Vec<usize> = (0..named.len()).collect();
            let plan = chain_stack(&order, &named).build_plan().unwrap();
            for i in 1..named.len() {
                let this = id(&format!("R{}", i));
                let prev = id(&format!("R{}", i - 1));
                let ordered = plan.batch_of(&prev) < plan.batch_of(&this);
                if named[i - 1] {
                    prop_assert!(!plan.graph().has_edge(&this, &prev));
                } else {
                    prop_assert!(ordered);
                }
            }
        }
    }
}
