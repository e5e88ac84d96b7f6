//! Identifier resolution at plan time.
//!
//! Every referenced identifier is either known before anything is created
//! (the caller supplied a physical name, so name and ARN can be rendered from
//! the stack environment) or only known once the provider has created the
//! resource. References to the first kind are substituted immediately and
//! impose no ordering; references to the second kind stay symbolic and become
//! graph edges.

use crate::error::{PlanError, PlanResult};
use crate::resource::{AttrRef, ResourceSpec};
use indexmap::IndexMap;
use stackwright_core::{Arn, Attribute, LogicalId, StackEnv};

/// How an identifier becomes known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierClass {
    /// Known at plan time
    Predictable(String),
    /// Known only after the provider creates the resource
    AssignedByProvider,
}

impl IdentifierClass {
    /// Get the predicted value, if any
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Predictable(v) => Some(v),
            Self::AssignedByProvider => None,
        }
    }
}

/// Predict an identifier of `spec` from its caller-supplied name
///
/// Returns `None` when the identifier is assigned by the provider.
#[must_use]
pub fn predict(env: &StackEnv, spec: &ResourceSpec, attribute: Attribute) -> Option<String> {
    let name = spec.physical_name()?;
    match attribute {
        Attribute::Name => Some(name.to_string()),
        Attribute::Arn => Arn::for_resource(env, spec.kind, name).map(|arn| arn.to_string()),
        Attribute::Endpoint => None,
    }
}

/// Classifies and substitutes identifier references
pub struct IdentifierResolver<'a> {
    /// Stack environment
    env: &'a StackEnv,
    /// Declared resources by ID
    specs: &'a IndexMap<LogicalId, ResourceSpec>,
}

impl<'a> IdentifierResolver<'a> {
    /// Create a resolver over the declared resources
    #[must_use]
    pub fn new(env: &'a StackEnv, specs: &'a IndexMap<LogicalId, ResourceSpec>) -> Self {
        Self { env, specs }
    }

    /// Classify a reference made by `source`
    ///
    /// # Errors
    ///
    /// Returns error if the target is undeclared or never has the attribute
    pub fn classify(&self, source: &LogicalId, reference: &AttrRef) -> PlanResult<IdentifierClass> {
        let target = self
            .specs
            .get(&reference.target)
            .ok_or_else(|| PlanError::UnresolvedReference {
                resource: source.clone(),
                target: reference.target.clone(),
            })?;

        if !target.kind.supports(reference.attribute) {
            return Err(PlanError::UnsupportedAttribute {
                resource: source.clone(),
                target: target.id.clone(),
                kind: target.kind,
                attribute: reference.attribute,
            });
        }

        Ok(match predict(self.env, target, reference.attribute) {
            Some(value) => IdentifierClass::Predictable(value),
            None => IdentifierClass::AssignedByProvider,
        })
    }

    /// Copy of `spec` with every predictable reference substituted
    ///
    /// # Errors
    ///
    /// Returns error if any reference cannot be classified
    pub fn resolve(&self, spec: &ResourceSpec) -> PlanResult<ResourceSpec> {
        let mut known = Vec::new();
        for reference in spec.property_refs() {
            if let IdentifierClass::Predictable(value) = self.classify(&spec.id, reference)? {
                known.push((reference.clone(), value));
            }
        }

        let mut resolved = spec.clone();
        resolved.substitute(|r| {
            known
                .iter()
                .find(|(k, _)| k.target == r.target && k.attribute == r.attribute)
                .map(|(_, v)| v.clone())
        });
        Ok(resolved)
    }
}
