//! Resource kinds and the identifier attributes they expose.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Type tag of a provisionable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Log group that collects application logs
    LogSink,
    /// Object storage bucket
    StorageBucket,
    /// Permission role assumed by services
    Role,
    /// Buffered delivery stream
    DeliveryStream,
    /// Subscription filter forwarding matching log events
    EventFilter,
    /// Compute function handling events
    ComputeFunction,
}

impl ResourceKind {
    /// All kinds, in declaration order
    pub const ALL: [ResourceKind; 6] = [
        Self::LogSink,
        Self::StorageBucket,
        Self::Role,
        Self::DeliveryStream,
        Self::EventFilter,
        Self::ComputeFunction,
    ];

    /// Get a string representation of the kind
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::LogSink => "LogSink",
            Self::StorageBucket => "StorageBucket",
            Self::Role => "Role",
            Self::DeliveryStream => "DeliveryStream",
            Self::EventFilter => "EventFilter",
            Self::ComputeFunction => "ComputeFunction",
        }
    }

    /// Service namespace used in ARNs and action tokens
    #[must_use]
    pub fn service(&self) -> &'static str {
        match self {
            Self::LogSink | Self::EventFilter => "logs",
            Self::StorageBucket => "s3",
            Self::Role => "iam",
            Self::DeliveryStream => "firehose",
            Self::ComputeFunction => "lambda",
        }
    }

    /// Service principal that acts on behalf of resources of this kind
    #[must_use]
    pub fn service_principal(&self) -> String {
        format!("{}.amazonaws.com", self.service())
    }

    /// Configuration property holding a caller-supplied physical name
    #[must_use]
    pub fn name_property(&self) -> &'static str {
        match self {
            Self::LogSink => "log_group_name",
            Self::StorageBucket => "bucket_name",
            Self::Role => "role_name",
            Self::DeliveryStream => "stream_name",
            Self::EventFilter => "filter_name",
            Self::ComputeFunction => "function_name",
        }
    }

    /// Whether resources of this kind contain addressable children
    /// (objects in a bucket, streams in a log group)
    #[must_use]
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::StorageBucket | Self::LogSink)
    }

    /// Whether this kind exposes the given identifier attribute
    #[must_use]
    pub fn supports(&self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Name => true,
            Attribute::Arn => !matches!(self, Self::EventFilter),
            Attribute::Endpoint => matches!(self, Self::DeliveryStream | Self::ComputeFunction),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.kind_name() == s)
            .ok_or_else(|| CoreError::Unknown {
                what: "resource kind".to_string(),
                value: s.to_string(),
            })
    }
}

/// Identifier attribute of a resource that other resources may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Physical name
    Name,
    /// Fully qualified resource name
    Arn,
    /// Network endpoint or invoke URL
    Endpoint,
}

impl Attribute {
    /// Get a string representation of the attribute
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Arn => "arn",
            Self::Endpoint => "endpoint",
        }
    }
}

impl Default for Attribute {
    fn default() -> Self {
        Self::Arn
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "name" => Ok(Self::Name),
            "arn" => Ok(Self::Arn),
            "endpoint" => Ok(Self::Endpoint),
            other => Err(CoreError::Unknown {
                what: "attribute".to_string(),
                value: other.to_string(),
            }),
        }
    }
}
