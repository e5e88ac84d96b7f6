//! Resources as they exist after apply.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stackwright_core::{Attribute, LogicalId, ResourceKind};
use stackwright_plan::{AttrRef, ResourceSpec};
use std::collections::BTreeMap;

/// Identifier attributes assigned by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<Attribute, String>);

impl Attributes {
    /// Create an empty attribute set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute
    #[must_use]
    pub fn with(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.0.insert(attribute, value.into());
        self
    }

    /// Set an attribute
    pub fn insert(&mut self, attribute: Attribute, value: impl Into<String>) {
        self.0.insert(attribute, value.into());
    }

    /// Get an attribute
    #[must_use]
    pub fn get(&self, attribute: Attribute) -> Option<&str> {
        self.0.get(&attribute).map(String::as_str)
    }

    /// Physical name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get(Attribute::Name)
    }

    /// ARN
    #[must_use]
    pub fn arn(&self) -> Option<&str> {
        self.get(Attribute::Arn)
    }

    /// Iterate attributes in order
    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Get number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A spec together with what the provider assigned to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedResource {
    /// Spec the resource was applied from
    pub spec: ResourceSpec,
    /// Configuration the provider was called with, references rendered
    #[serde(default)]
    pub config: serde_json::Value,
    /// Provider-assigned identifiers
    pub attributes: Attributes,
}

impl ResolvedResource {
    /// Logical ID
    #[must_use]
    pub fn id(&self) -> &LogicalId {
        &self.spec.id
    }

    /// Kind
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind
    }
}

/// Resolved resources of one run, in the order they were recorded
///
/// Written only by the engine's batch loop; read-only for everyone else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMap {
    resources: IndexMap<LogicalId, ResolvedResource>,
}

impl ResolvedMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, resource: ResolvedResource) {
        self.resources.insert(resource.spec.id.clone(), resource);
    }

    pub(crate) fn remove(&mut self, id: &LogicalId) -> Option<ResolvedResource> {
        self.resources.shift_remove(id)
    }

    /// Get a resolved resource
    #[must_use]
    pub fn get(&self, id: &LogicalId) -> Option<&ResolvedResource> {
        self.resources.get(id)
    }

    /// Whether a resource was resolved
    #[must_use]
    pub fn contains(&self, id: &LogicalId) -> bool {
        self.resources.contains_key(id)
    }

    /// Bare identifier a reference points at
    ///
    /// The reference's suffix is not applied here; [`AttrRef::render`] does
    /// that when the configuration is rendered.
    #[must_use]
    pub fn lookup(&self, reference: &AttrRef) -> Option<String> {
        self.resources
            .get(&reference.target)
            .and_then(|r| r.attributes.get(reference.attribute))
            .map(str::to_string)
    }

    /// Resolved IDs in record order
    pub fn ids(&self) -> impl Iterator<Item = &LogicalId> {
        self.resources.keys()
    }

    /// Resolved resources in record order
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedResource> {
        self.resources.values()
    }

    /// Get number of resolved resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
