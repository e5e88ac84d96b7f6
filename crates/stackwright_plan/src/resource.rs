//! Declared resources and their configuration properties.
//!
//! A [`ResourceSpec`] carries an ordered map of typed property values.
//! Values form a small tree; [`PropertyValue::Ref`] is a symbolic reference
//! to another resource's identifier and is the only way one resource's
//! configuration mentions another's.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use stackwright_core::{Attribute, LogicalId, ResourceKind};

/// Symbolic reference to an identifier attribute of another resource
///
/// Serialized as `{"ref": "Target", "attribute": "arn", "suffix": "/*"}`;
/// `attribute` defaults to `arn` and `suffix` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttrRef {
    /// Referenced resource
    #[serde(rename = "ref")]
    pub target: LogicalId,
    /// Referenced identifier
    #[serde(default)]
    pub attribute: Attribute,
    /// Literal appended to the identifier value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl AttrRef {
    /// Reference an attribute of `target`
    #[must_use]
    pub fn new(target: LogicalId, attribute: Attribute) -> Self {
        Self {
            target,
            attribute,
            suffix: None,
        }
    }

    /// Reference the physical name of `target`
    #[must_use]
    pub fn name(target: LogicalId) -> Self {
        Self::new(target, Attribute::Name)
    }

    /// Reference the ARN of `target`
    #[must_use]
    pub fn arn(target: LogicalId) -> Self {
        Self::new(target, Attribute::Arn)
    }

    /// Reference the endpoint of `target`
    #[must_use]
    pub fn endpoint(target: LogicalId) -> Self {
        Self::new(target, Attribute::Endpoint)
    }

    /// Append a literal suffix to the referenced value
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Final value given the referenced identifier
    #[must_use]
    pub fn render(&self, identifier: &str) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}{}", identifier, suffix),
            None => identifier.to_string(),
        }
    }
}

impl std::fmt::Display for AttrRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "+{:?}", suffix)?;
        }
        Ok(())
    }
}

/// Typed configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Literal string
    String(String),
    /// Identifier of another resource
    Ref(AttrRef),
    /// Ordered list
    List(Vec<PropertyValue>),
    /// Ordered map
    Map(IndexMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Build a map value from key/value pairs
    #[must_use]
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, PropertyValue)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Get the string, if this is a literal string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collect every reference in this value, depth first
    pub fn collect_refs<'a>(&'a self, out: &mut Vec<&'a AttrRef>) {
        match self {
            Self::Ref(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Map(entries) => entries.values().for_each(|v| v.collect_refs(out)),
            Self::Bool(_) | Self::Integer(_) | Self::String(_) => {}
        }
    }

    /// Replace references for which `lookup` yields an identifier with the
    /// rendered string; others are left in place
    pub fn substitute<F>(&mut self, lookup: &mut F)
    where
        F: FnMut(&AttrRef) -> Option<String>,
    {
        match self {
            Self::Ref(r) => {
                if let Some(identifier) = lookup(r) {
                    *self = Self::String(r.render(&identifier));
                }
            }
            Self::List(items) => items.iter_mut().for_each(|v| v.substitute(lookup)),
            Self::Map(entries) => entries.values_mut().for_each(|v| v.substitute(lookup)),
            Self::Bool(_) | Self::Integer(_) | Self::String(_) => {}
        }
    }

    /// Render to JSON, resolving every reference through `lookup`
    ///
    /// `lookup` yields the bare identifier; the reference's suffix is
    /// appended here.
    ///
    /// # Errors
    ///
    /// Returns the first reference `lookup` cannot resolve
    pub fn to_json<F>(&self, lookup: &F) -> Result<serde_json::Value, AttrRef>
    where
        F: Fn(&AttrRef) -> Option<String>,
    {
        use serde_json::Value;

        Ok(match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::String(s.clone()),
            Self::Ref(r) => match lookup(r) {
                Some(identifier) => Value::String(r.render(&identifier)),
                None => return Err(r.clone()),
            },
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json(lookup))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(entries) => {
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json(lookup)?);
                }
                Value::Object(map)
            }
        })
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<AttrRef> for PropertyValue {
    fn from(r: AttrRef) -> Self {
        Self::Ref(r)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(items: Vec<PropertyValue>) -> Self {
        Self::List(items)
    }
}

/// A declared resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Logical ID, stable across runs
    pub id: LogicalId,
    /// Type tag
    pub kind: ResourceKind,
    /// Type-specific configuration
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, PropertyValue>,
    /// Resources that must exist before this one
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub references: IndexSet<LogicalId>,
}

impl ResourceSpec {
    /// Create a spec with no properties or references
    #[must_use]
    pub fn new(id: LogicalId, kind: ResourceKind) -> Self {
        Self {
            id,
            kind,
            properties: IndexMap::new(),
            references: IndexSet::new(),
        }
    }

    /// Set a property
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the caller-supplied physical name
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        let key = self.kind.name_property();
        self.with_property(key, name.into())
    }

    /// Declare a dependency
    #[must_use]
    pub fn with_reference(mut self, target: LogicalId) -> Self {
        self.references.insert(target);
        self
    }

    /// Get a property
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Caller-supplied physical name, if any
    #[must_use]
    pub fn physical_name(&self) -> Option<&str> {
        self.property(self.kind.name_property())
            .and_then(PropertyValue::as_str)
    }

    /// All references held in properties, in property order
    #[must_use]
    pub fn property_refs(&self) -> Vec<&AttrRef> {
        let mut out = Vec::new();
        for value in self.properties.values() {
            value.collect_refs(&mut out);
        }
        out
    }

    /// Replace resolvable references in every property
    pub fn substitute<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&AttrRef) -> Option<String>,
    {
        for value in self.properties.values_mut() {
            value.substitute(&mut lookup);
        }
    }

    /// Render the configuration handed to a provider
    ///
    /// # Errors
    ///
    /// Returns the first reference `lookup` cannot resolve
    pub fn render_config<F>(&self, lookup: F) -> Result<serde_json::Value, AttrRef>
    where
        F: Fn(&AttrRef) -> Option<String>,
    {
        let mut map = serde_json::Map::with_capacity(self.properties.len());
        for (key, value) in &self.properties {
            map.insert(key.clone(), value.to_json(&lookup)?);
        }
        Ok(serde_json::Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    #[test]
    fn test_property_value_from_json() {
        let value: PropertyValue = serde_json::from_value(json!({
            "retention_in_days": 7,
            "enabled": true,
            "target": {"ref": "Bucket"},
            "objects": {"ref": "Bucket", "attribute": "arn", "suffix": "/*"},
            "tags": ["a", "b"]
        }))
        .unwrap();

        let PropertyValue::Map(entries) = &value else {
            panic!("expected map");
        };
        assert_eq!(entries["retention_in_days"], PropertyValue::Integer(7));
        assert_eq!(entries["enabled"], PropertyValue::Bool(true));
        assert_eq!(entries["target"], PropertyValue::Ref(AttrRef::arn(id("Bucket"))));
        assert_eq!(
            entries["objects"],
            PropertyValue::Ref(AttrRef::arn(id("Bucket")).with_suffix("/*"))
        );
        assert!(matches!(entries["tags"], PropertyValue::List(_)));
    }

    #[test]
    fn test_map_with_extra_keys_is_not_a_ref() {
        let value: PropertyValue =
            serde_json::from_value(json!({"ref": "Bucket", "other": 1})).unwrap();
        assert!(matches!(value, PropertyValue::Map(_)));
    }

    #[test]
    fn test_collect_refs_depth_first() {
        let spec = ResourceSpec::new(id("Role"), ResourceKind::Role)
            .with_property("a", AttrRef::name(id("X")))
            .with_property(
                "b",
                PropertyValue::map([("inner", PropertyValue::List(vec![AttrRef::arn(id("Y")).into()]))]),
            );
        let targets: Vec<_> = spec.property_refs().iter().map(|r| r.target.clone()).collect();
        assert_eq!(targets, vec![id("X"), id("Y")]);
    }

    #[test]
    fn test_substitute_only_resolvable() {
        let mut spec = ResourceSpec::new(id("Stream"), ResourceKind::DeliveryStream)
            .with_property("bucket_arn", AttrRef::arn(id("Bucket")).with_suffix("/*"))
            .with_property("role_arn", AttrRef::arn(id("Role")));

        spec.substitute(|r| (r.target.as_str() == "Bucket").then(|| "arn:aws:s3:::b".to_string()));

        assert_eq!(spec.property("bucket_arn").and_then(PropertyValue::as_str), Some("arn:aws:s3:::b/*"));
        assert!(matches!(spec.property("role_arn"), Some(PropertyValue::Ref(_))));
    }

    #[test]
    fn test_render_config_reports_missing_ref() {
        let spec = ResourceSpec::new(id("Stream"), ResourceKind::DeliveryStream)
            .with_property("role_arn", AttrRef::arn(id("Role")));
        let missing = spec.render_config(|_| None).unwrap_err();
        assert_eq!(missing.target, id("Role"));

        let config = spec
            .render_config(|_| Some("arn:aws:iam::000000000000:role/r".to_string()))
            .unwrap();
        assert_eq!(config, json!({"role_arn": "arn:aws:iam::000000000000:role/r"}));
    }

    #[test]
    fn test_physical_name_uses_kind_property() {
        let spec = ResourceSpec::new(id("Bucket"), ResourceKind::StorageBucket).with_name("events");
        assert_eq!(spec.physical_name(), Some("events"));
        assert!(spec.property("bucket_name").is_some());

        let unnamed = ResourceSpec::new(id("Bucket"), ResourceKind::StorageBucket);
        assert_eq!(unnamed.physical_name(), None);
    }

    #[test]
    fn test_spec_serde() {
        let spec: ResourceSpec = serde_json::from_value(json!({
            "id": "Stream",
            "kind": "DeliveryStream",
            "properties": {"role_arn": {"ref": "Role"}},
            "references": ["Bucket"]
        }))
        .unwrap();
        assert_eq!(spec.kind, ResourceKind::DeliveryStream);
        assert!(spec.references.contains(&id("Bucket")));
        assert_eq!(spec.property_refs().len(), 1);
    }
}
