//! Dependency graph between declared resources.
//!
//! Edges point from a resource to the resources it depends on. They come from
//! declared references and from property references that are still symbolic
//! after identifier resolution.

use crate::error::{PlanError, PlanResult};
use crate::resource::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use stackwright_core::LogicalId;

/// Validated, acyclic dependency graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Resource -> resources it depends on
    edges: BTreeMap<LogicalId, BTreeSet<LogicalId>>,
}

impl DependencyGraph {
    /// All resources, sorted
    pub fn nodes(&self) -> impl Iterator<Item = &LogicalId> {
        self.edges.keys()
    }

    /// Direct dependencies of a resource
    #[must_use]
    pub fn dependencies(&self, id: &LogicalId) -> Option<&BTreeSet<LogicalId>> {
        self.edges.get(id)
    }

    /// Resources that directly depend on `id`, sorted
    #[must_use]
    pub fn dependents(&self, id: &LogicalId) -> Vec<&LogicalId> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(node, _)| node)
            .collect()
    }

    /// Whether `from` directly depends on `to`
    #[must_use]
    pub fn has_edge(&self, from: &LogicalId, to: &LogicalId) -> bool {
        self.edges.get(from).is_some_and(|deps| deps.contains(to))
    }

    /// Whether `from` depends on `to` through any path
    #[must_use]
    pub fn depends_on(&self, from: &LogicalId, to: &LogicalId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(deps) = self.edges.get(current) {
                if deps.contains(to) {
                    return true;
                }
                stack.extend(deps.iter());
            }
        }
        false
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// DFS visit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Accumulates nodes and edges, then validates them into a
/// [`DependencyGraph`]
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    edges: BTreeMap<LogicalId, BTreeSet<LogicalId>>,
    /// Edges whose source has not been added yet
    undeclared: BTreeMap<LogicalId, BTreeSet<LogicalId>>,
}

impl GraphBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder over resolved specs: one node per spec, edges for declared
    /// references and remaining symbolic references
    ///
    /// # Errors
    ///
    /// Returns error if two specs share a logical ID
    pub fn from_specs<'a, I>(specs: I) -> PlanResult<Self>
    where
        I: IntoIterator<Item = &'a ResourceSpec>,
    {
        let specs: Vec<&ResourceSpec> = specs.into_iter().collect();
        let mut builder = Self::new();
        for spec in &specs {
            builder.add_node(spec.id.clone())?;
        }
        for spec in specs {
            for target in &spec.references {
                builder.add_edge(spec.id.clone(), target.clone());
            }
            for reference in spec.property_refs() {
                builder.add_edge(spec.id.clone(), reference.target.clone());
            }
        }
        Ok(builder)
    }

    /// Add a node
    ///
    /// # Errors
    ///
    /// Returns error if the node already exists
    pub fn add_node(&mut self, id: LogicalId) -> PlanResult<()> {
        if self.edges.contains_key(&id) {
            return Err(PlanError::DuplicateResource { id });
        }
        let deps = self.undeclared.remove(&id).unwrap_or_default();
        self.edges.insert(id, deps);
        Ok(())
    }

    /// Record that `from` depends on `to`
    ///
    /// Neither end needs to be added yet; edges whose ends are still unknown
    /// at [`GraphBuilder::build`] are reported there.
    pub fn add_edge(&mut self, from: LogicalId, to: LogicalId) {
        match self.edges.get_mut(&from) {
            Some(deps) => {
                deps.insert(to);
            }
            None => {
                self.undeclared.entry(from).or_default().insert(to);
            }
        }
    }

    /// Validate and freeze the graph
    ///
    /// # Errors
    ///
    /// Returns error on an edge from or to an unknown node, or on a cycle
    pub fn build(self) -> PlanResult<DependencyGraph> {
        if let Some(id) = self.undeclared.keys().next() {
            return Err(PlanError::UndeclaredResource { id: id.clone() });
        }

        for (source, deps) in &self.edges {
            if let Some(target) = deps.iter().find(|d| !self.edges.contains_key(*d)) {
                return Err(PlanError::UnresolvedReference {
                    resource: source.clone(),
                    target: target.clone(),
                });
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(PlanError::Cycle { cycle });
        }

        Ok(DependencyGraph { edges: self.edges })
    }

    /// Depth-first search in sorted order; the first back-edge found yields
    /// the cycle from its entry point
    fn find_cycle(&self) -> Option<Vec<LogicalId>> {
        let mut marks: BTreeMap<&LogicalId, Mark> = BTreeMap::new();
        let mut path: Vec<&LogicalId> = Vec::new();

        for node in self.edges.keys() {
            if let Some(cycle) = self.visit(node, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'g>(
        &'g self,
        node: &'g LogicalId,
        marks: &mut BTreeMap<&'g LogicalId, Mark>,
        path: &mut Vec<&'g LogicalId>,
    ) -> Option<Vec<LogicalId>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| *n == node)?;
                return Some(path[start..].iter().map(|n| (*n).clone()).collect());
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);
        path.push(node);

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if let Some(cycle) = self.visit(dep, marks, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stackwright_core::ResourceKind;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn builder(nodes: &[&str], edges: &[(&str, &str)]) -> GraphBuilder {
        let mut b = GraphBuilder::new();
        for n in nodes {
            b.add_node(id(n)).unwrap();
        }
        for (from, to) in edges {
            b.add_edge(id(from), id(to));
        }
        b
    }

    #[test]
    fn test_build_acyclic() {
        let graph = builder(&["A", "B", "C"], &[("B", "A"), ("C", "B")]).build().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge(&id("B"), &id("A")));
        assert!(graph.depends_on(&id("C"), &id("A")));
        assert!(!graph.depends_on(&id("A"), &id("C")));
        assert_eq!(graph.dependents(&id("A")), vec![&id("B")]);
    }

    #[test]
    fn test_two_node_cycle() {
        let err = builder(&["A", "B"], &[("A", "B"), ("B", "A")]).build().unwrap_err();
        assert_eq!(err, PlanError::Cycle { cycle: vec![id("A"), id("B")] });
    }

    #[test]
    fn test_cycle_reported_from_entry_point() {
        // Root -> X -> Y -> Z -> X
        let err = builder(
            &["Root", "X", "Y", "Z"],
            &[("Root", "X"), ("X", "Y"), ("Y", "Z"), ("Z", "X")],
        )
        .build()
        .unwrap_err();
        assert_eq!(err, PlanError::Cycle { cycle: vec![id("X"), id("Y"), id("Z")] });
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let err = builder(&["A"], &[("A", "A")]).build().unwrap_err();
        assert_eq!(err, PlanError::Cycle { cycle: vec![id("A")] });
    }

    #[test]
    fn test_unknown_target() {
        let err = builder(&["A"], &[("A", "Ghost")]).build().unwrap_err();
        assert_eq!(
            err,
            PlanError::UnresolvedReference {
                resource: id("A"),
                target: id("Ghost"),
            }
        );
    }

    #[test]
    fn test_edge_from_undeclared_resource() {
        let err = builder(&["A"], &[("Ghost", "A")]).build().unwrap_err();
        assert_eq!(err, PlanError::UndeclaredResource { id: id("Ghost") });
        assert_eq!(err.offending_ids(), vec![id("Ghost")]);
    }

    #[test]
    fn test_edge_before_its_source_is_added() {
        let mut b = GraphBuilder::new();
        b.add_node(id("A")).unwrap();
        b.add_edge(id("B"), id("A"));
        b.add_node(id("B")).unwrap();

        let graph = b.build().unwrap();
        assert_eq!(graph.node_count(), 2);
        assert!(graph.has_edge(&id("B"), &id("A")));
    }

    #[test]
    fn test_duplicate_node() {
        let mut b = GraphBuilder::new();
        b.add_node(id("A")).unwrap();
        assert_eq!(
            b.add_node(id("A")).unwrap_err(),
            PlanError::DuplicateResource { id: id("A") }
        );
    }

    #[test]
    fn test_from_specs_uses_refs_and_references() {
        use crate::resource::AttrRef;

        let bucket = ResourceSpec::new(id("Bucket"), ResourceKind::StorageBucket);
        let role = ResourceSpec::new(id("Role"), ResourceKind::Role);
        let stream = ResourceSpec::new(id("Stream"), ResourceKind::DeliveryStream)
            .with_property("role_arn", AttrRef::arn(id("Role")))
            .with_reference(id("Bucket"));

        let graph = GraphBuilder::from_specs([&bucket, &role, &stream])
            .unwrap()
            .build()
            .unwrap();
        assert!(graph.has_edge(&id("Stream"), &id("Role")));
        assert!(graph.has_edge(&id("Stream"), &id("Bucket")));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_empty_graph() {
        let graph = GraphBuilder::new().build().unwrap();
        assert!(graph.is_empty());
    }

    proptest! {
        #[test]
        fn prop_reported_cycle_follows_edges(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..20)
        ) {
            let names: Vec<String> = (0..8).map(|i| format!("N{}", i)).collect();
            let nodes: Vec<&str> = names.iter().map(String::as_str).collect();
            let pairs: Vec<(&str, &str)> = edges.iter().map(|(a, b)| (nodes[*a], nodes[*b])).collect();

            match builder(&nodes, &pairs).build() {
                Ok(graph) => {
                    for node in &nodes {
                        prop_assert!(!graph.depends_on(&id(node), &id(node)));
                    }
                }
                Err(PlanError::Cycle { cycle }) => {
                    prop_assert!(!cycle.is_empty());
                    for (i, from) in cycle.iter().enumerate() {
                        let to = &cycle[(i + 1) % cycle.len()];
                        prop_assert!(pairs.contains(&(from.as_str(), to.as_str())));
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }
    }
}
