//! Rendered policy documents and their evaluation.
//!
//! The planner renders grants into this shape (with identifiers still
//! symbolic); once the apply engine substitutes identifiers, the resulting
//! JSON deserializes back into [`PolicyDocument`] and can be evaluated.

use crate::error::PolicyResult;
use crate::matcher::{glob_match, match_any};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy language version written into every document
pub const POLICY_VERSION: &str = "2012-10-17";

/// Condition operator for exact ARN restrictions
pub const ARN_EQUALS: &str = "ArnEquals";

/// Condition operator for pattern ARN restrictions
pub const ARN_LIKE: &str = "ArnLike";

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Permit the matched requests
    Allow,
    /// Refuse the matched requests; wins over Allow
    Deny,
}

/// Service principal block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Service principal name
    #[serde(rename = "Service")]
    pub service: String,
}

/// One policy statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Statement identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Effect
    pub effect: Effect,
    /// Action patterns
    pub action: Vec<String>,
    /// Resource patterns; empty for trust statements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    /// Principal allowed to act
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    /// Conditions: operator -> key -> value
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: BTreeMap<String, BTreeMap<String, String>>,
}

impl Statement {
    /// Whether the statement covers `action` on `resource`
    fn covers(&self, action: &str, resource: &str) -> PolicyResult<bool> {
        Ok(match_any(&self.action, action)? && match_any(&self.resource, resource)?)
    }

    /// Whether all conditions hold for the given context values
    fn conditions_hold(&self, context: &BTreeMap<String, String>) -> PolicyResult<bool> {
        for (operator, entries) in &self.condition {
            for (key, expected) in entries {
                let Some(actual) = context.get(key) else {
                    return Ok(false);
                };
                let holds = match operator.as_str() {
                    ARN_LIKE => glob_match(expected, actual)?,
                    _ => expected == actual,
                };
                if !holds {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// A policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version
    pub version: String,
    /// Statements
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: Vec::new(),
        }
    }

    /// Parse a rendered document
    ///
    /// # Errors
    ///
    /// Returns error if the value is not a policy document
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Whether an identity policy allows `action` on `resource`
    ///
    /// # Errors
    ///
    /// Returns error if a pattern in the document is invalid
    pub fn allows(&self, action: &str, resource: &str) -> PolicyResult<bool> {
        let mut allowed = false;
        for stmt in &self.statement {
            if stmt.covers(action, resource)? {
                match stmt.effect {
                    Effect::Deny => return Ok(false),
                    Effect::Allow => allowed = true,
                }
            }
        }
        Ok(allowed)
    }

    /// Whether a trust or resource policy admits `service` performing
    /// `action` on behalf of `source_arn`
    ///
    /// # Errors
    ///
    /// Returns error if a pattern in the document is invalid
    pub fn admits(&self, service: &str, action: &str, source_arn: &str) -> PolicyResult<bool> {
        let context = BTreeMap::from([(
            crate::grant::SOURCE_ARN_KEY.to_string(),
            source_arn.to_string(),
        )]);

        let mut admitted = false;
        for stmt in &self.statement {
            let principal_matches = stmt
                .principal
                .as_ref()
                .is_some_and(|p| p.service == service);
            if !principal_matches || !match_any(&stmt.action, action)? {
                continue;
            }
            if !stmt.conditions_hold(&context)? {
                continue;
            }
            match stmt.effect {
                Effect::Deny => return Ok(false),
                Effect::Allow => admitted = true,
            }
        }
        Ok(admitted)
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new()
    }
}
