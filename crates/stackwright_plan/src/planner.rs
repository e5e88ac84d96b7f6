//! Batch planning over the dependency graph.
//!
//! Kahn's algorithm: each batch holds every remaining resource whose
//! dependencies are all in earlier batches, sorted by logical ID. Members of
//! a batch are independent and may be applied concurrently.

use crate::dag::DependencyGraph;
use crate::error::{PlanError, PlanResult};
use crate::resource::ResourceSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackwright_core::{LogicalId, StackEnv};
use std::collections::{BTreeMap, BTreeSet};

/// Resources that can be applied together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Position in the plan
    pub index: usize,
    /// Members, sorted by logical ID
    pub members: Vec<LogicalId>,
}

impl Batch {
    /// Get number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if batch is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Ordered batches plus everything needed to apply them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Environment every identifier was rendered for
    env: StackEnv,
    /// Batches in apply order
    batches: Vec<Batch>,
    /// Resolved specs by ID, in declaration order
    specs: IndexMap<LogicalId, ResourceSpec>,
    /// Graph the batches were derived from
    graph: DependencyGraph,
}

impl Plan {
    /// Stack environment
    #[must_use]
    pub fn env(&self) -> &StackEnv {
        &self.env
    }

    /// Batches in apply order
    #[must_use]
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Index of the batch containing `id`
    #[must_use]
    pub fn batch_of(&self, id: &LogicalId) -> Option<usize> {
        self.batches
            .iter()
            .find(|b| b.members.contains(id))
            .map(|b| b.index)
    }

    /// Resolved spec of a resource
    #[must_use]
    pub fn spec(&self, id: &LogicalId) -> Option<&ResourceSpec> {
        self.specs.get(id)
    }

    /// All resolved specs, in declaration order
    pub fn specs(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.values()
    }

    /// Direct dependencies of a resource
    #[must_use]
    pub fn dependencies(&self, id: &LogicalId) -> Option<&BTreeSet<LogicalId>> {
        self.graph.dependencies(id)
    }

    /// Dependency graph
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Resource IDs in apply order
    pub fn ordered_ids(&self) -> impl Iterator<Item = &LogicalId> {
        self.batches.iter().flat_map(|b| b.members.iter())
    }

    /// Get number of resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if plan is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Topological batch planner
#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    /// Create a planner
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compute batches for `graph`
    ///
    /// # Errors
    ///
    /// Returns error naming the resources left when no remaining resource
    /// has all its dependencies scheduled
    pub fn batches(&self, graph: &DependencyGraph) -> PlanResult<Vec<Batch>> {
        let mut pending: BTreeMap<&LogicalId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&LogicalId, Vec<&LogicalId>> = BTreeMap::new();

        for node in graph.nodes() {
            let deps = graph.dependencies(node).map_or(0, BTreeSet::len);
            pending.insert(node, deps);
            for dep in graph.dependencies(node).into_iter().flatten() {
                dependents.entry(dep).or_default().push(node);
            }
        }

        let mut batches = Vec::new();
        while !pending.is_empty() {
            let ready: Vec<&LogicalId> = pending
                .iter()
                .filter(|(_, remaining)| **remaining == 0)
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                return Err(PlanError::Planning {
                    remaining: pending.keys().map(|id| (*id).clone()).collect(),
                });
            }

            for id in &ready {
                pending.remove(*id);
                for dependent in dependents.get(*id).into_iter().flatten() {
                    if let Some(remaining) = pending.get_mut(*dependent) {
                        *remaining = remaining.saturating_sub(1);
                    }
                }
            }

            batches.push(Batch {
                index: batches.len(),
                members: ready.into_iter().cloned().collect(),
            });
        }

        Ok(batches)
    }

    /// Build a plan from resolved specs and their graph
    ///
    /// # Errors
    ///
    /// Returns error if the graph cannot be scheduled
    pub fn plan(
        &self,
        env: StackEnv,
        specs: IndexMap<LogicalId, ResourceSpec>,
        graph: DependencyGraph,
    ) -> PlanResult<Plan> {
        let batches = self.batches(&graph)?;
        Ok(Plan {
            env,
            batches,
            specs,
            graph,
        })
    }
}
