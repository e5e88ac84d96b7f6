//! ARN-like resource names.
//!
//! Format: `arn:{partition}:{service}:{region}:{account}:{resource}`.
//! Global services leave region and/or account empty.

use crate::env::StackEnv;
use crate::error::{CoreError, CoreResult};
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A parsed resource name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Arn {
    /// Partition
    pub partition: String,
    /// Service namespace
    pub service: String,
    /// Region (empty for global services)
    pub region: String,
    /// Account (empty for account-less resources)
    pub account: String,
    /// Service-specific resource path
    pub resource: String,
}

impl Arn {
    /// Render the ARN a resource of `kind` named `name` receives in `env`
    ///
    /// Returns `None` for kinds that have no ARN.
    #[must_use]
    pub fn for_resource(env: &StackEnv, kind: ResourceKind, name: &str) -> Option<Self> {
        let (region, account, resource) = match kind {
            ResourceKind::LogSink => (
                env.region.clone(),
                env.account.clone(),
                format!("log-group:{}", name),
            ),
            ResourceKind::StorageBucket => (String::new(), String::new(), name.to_string()),
            ResourceKind::Role => (String::new(), env.account.clone(), format!("role/{}", name)),
            ResourceKind::DeliveryStream => (
                env.region.clone(),
                env.account.clone(),
                format!("deliverystream/{}", name),
            ),
            ResourceKind::ComputeFunction => (
                env.region.clone(),
                env.account.clone(),
                format!("function:{}", name),
            ),
            ResourceKind::EventFilter => return None,
        };
        Some(Self {
            partition: env.partition.clone(),
            service: kind.service().to_string(),
            region,
            account,
            resource,
        })
    }

    /// Pattern covering every resource of `service` in the environment's
    /// account and region
    #[must_use]
    pub fn service_scope(env: &StackEnv, service: &str) -> Self {
        Self {
            partition: env.partition.clone(),
            service: service.to_string(),
            region: env.region.clone(),
            account: env.account.clone(),
            resource: "*".to_string(),
        }
    }
}

impl std::fmt::Display for Arn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

impl FromStr for Arn {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::InvalidArn {
            arn: s.to_string(),
            reason: reason.to_string(),
        };

        // The resource part may itself contain ':' so split at most six ways
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        if parts.len() != 6 {
            return Err(invalid("expected six ':'-separated fields"));
        }
        if parts[0] != "arn" {
            return Err(invalid("must start with \"arn\""));
        }
        if parts[1].is_empty() || parts[2].is_empty() {
            return Err(invalid("partition and service must not be empty"));
        }
        if parts[5].is_empty() {
            return Err(invalid("resource must not be empty"));
        }

        Ok(Self {
            partition: parts[1].to_string(),
            service: parts[2].to_string(),
            region: parts[3].to_string(),
            account: parts[4].to_string(),
            resource: parts[5].to_string(),
        })
    }
}

impl TryFrom<String> for Arn {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        value.parse()
    }
}

impl From<Arn> for String {
    fn from(arn: Arn) -> Self {
        arn.to_string()
    }
}
