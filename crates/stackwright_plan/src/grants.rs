//! Renders synthesized grants into policy-document properties.
//!
//! | grant kind      | property on subject |
//! |-----------------|---------------------|
//! | `Identity`      | `policy_document`   |
//! | `Trust`         | `trust_policy`      |
//! | `ResourceBased` | `resource_policy`   |
//!
//! Resource patterns become references to the target's ARN, so a grant on a
//! provider-assigned target orders the role after it. Source conditions are
//! rendered as plain strings and never add an edge: the producer's exact ARN
//! when its name is known, otherwise a pattern scoped to its service in the
//! stack's account and region.

use crate::error::{PlanError, PlanResult};
use crate::identifier::predict;
use crate::resource::{AttrRef, PropertyValue, ResourceSpec};
use indexmap::IndexMap;
use stackwright_core::{Arn, Attribute, LogicalId, StackEnv};
use stackwright_policy::{GrantKind, PermissionGrant, ARN_EQUALS, ARN_LIKE, POLICY_VERSION};

/// Property holding a role's access policy
pub const POLICY_DOCUMENT: &str = "policy_document";

/// Property holding a role's assume-role policy
pub const TRUST_POLICY: &str = "trust_policy";

/// Property holding a resource's own policy
pub const RESOURCE_POLICY: &str = "resource_policy";

/// Property a grant kind is rendered into
#[must_use]
pub fn property_for(kind: GrantKind) -> &'static str {
    match kind {
        GrantKind::Identity => POLICY_DOCUMENT,
        GrantKind::Trust => TRUST_POLICY,
        GrantKind::ResourceBased => RESOURCE_POLICY,
    }
}

/// Attach every grant to its subject spec
///
/// # Errors
///
/// Returns error if a subject is undeclared or already holds a property of
/// the same name that is not a policy document
pub fn attach_grants(
    env: &StackEnv,
    specs: &mut IndexMap<LogicalId, ResourceSpec>,
    grants: &[PermissionGrant],
) -> PlanResult<()> {
    for grant in grants {
        let statement = render_statement(env, specs, grant);
        let subject = specs
            .get_mut(&grant.subject)
            .ok_or_else(|| PlanError::UnresolvedReference {
                resource: grant.subject.clone(),
                target: grant.subject.clone(),
            })?;
        push_statement(subject, property_for(grant.kind), statement)?;
    }
    Ok(())
}

/// Render one grant as a policy statement
fn render_statement(
    env: &StackEnv,
    specs: &IndexMap<LogicalId, ResourceSpec>,
    grant: &PermissionGrant,
) -> PropertyValue {
    let mut statement: IndexMap<String, PropertyValue> = IndexMap::new();
    statement.insert("Sid".to_string(), sid(grant).into());
    statement.insert("Effect".to_string(), "Allow".into());
    statement.insert(
        "Action".to_string(),
        PropertyValue::List(grant.actions.iter().map(|a| a.as_str().into()).collect()),
    );

    if !grant.patterns.is_empty() {
        let resources = grant
            .patterns
            .iter()
            .map(|p| {
                let reference = match &p.suffix {
                    Some(suffix) => AttrRef::arn(p.target.clone()).with_suffix(suffix.clone()),
                    None => AttrRef::arn(p.target.clone()),
                };
                PropertyValue::Ref(reference)
            })
            .collect();
        statement.insert("Resource".to_string(), PropertyValue::List(resources));
    }

    if let Some(principal) = &grant.principal {
        statement.insert(
            "Principal".to_string(),
            PropertyValue::map([("Service", principal.as_str().into())]),
        );
    }

    if let Some(condition) = &grant.condition {
        let (operator, value) = match specs
            .get(&condition.source)
            .and_then(|source| predict(env, source, Attribute::Arn))
        {
            Some(arn) => (ARN_EQUALS, arn),
            None => {
                let service = specs
                    .get(&condition.source)
                    .map_or("*", |source| source.kind.service());
                (ARN_LIKE, Arn::service_scope(env, service).to_string())
            }
        };
        statement.insert(
            "Condition".to_string(),
            PropertyValue::map([(
                operator,
                PropertyValue::map([(condition.key.as_str(), value.into())]),
            )]),
        );
    }

    PropertyValue::Map(statement)
}

/// Statement ID: grant kind plus the resource it concerns, alphanumerics only
fn sid(grant: &PermissionGrant) -> String {
    let (prefix, about) = match grant.kind {
        GrantKind::Identity => ("Access", &grant.resource),
        GrantKind::Trust => ("TrustFrom", grant.condition.as_ref().map_or(&grant.resource, |c| &c.source)),
        GrantKind::ResourceBased => ("AllowFrom", grant.condition.as_ref().map_or(&grant.resource, |c| &c.source)),
    };
    format!("{}{}", prefix, about)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Append a statement to the document held in `property`, creating the
/// document if needed
fn push_statement(spec: &mut ResourceSpec, property: &str, statement: PropertyValue) -> PlanResult<()> {
    let id = spec.id.clone();
    let invalid = |reason: &str| PlanError::InvalidProperty {
        id: id.clone(),
        property: property.to_string(),
        reason: reason.to_string(),
    };

    match spec.properties.get_mut(property) {
        None => {
            let document = PropertyValue::map([
                ("Version", POLICY_VERSION.into()),
                ("Statement", PropertyValue::List(vec![statement])),
            ]);
            spec.properties.insert(property.to_string(), document);
            Ok(())
        }
        Some(PropertyValue::Map(document)) => match document.get_mut("Statement") {
            Some(PropertyValue::List(statements)) => {
                statements.push(statement);
                Ok(())
            }
            _ => Err(invalid("expected a policy document with a Statement list")),
        },
        Some(_) => Err(invalid("expected a policy document")),
    }
}
