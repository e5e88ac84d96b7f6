//! Declared data-flow intents.

use serde::{Deserialize, Serialize};
use stackwright_core::LogicalId;

/// Direction and breadth of access a flow needs on its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Read-only access
    Read,
    /// Write-only access
    Write,
    /// Invoke a compute target
    Invoke,
    /// Full administrative access
    Admin,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Invoke => "invoke",
            Self::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// "`producer` sends data into `consumer`"
///
/// With a `role`, the producer's service assumes that role to reach the
/// consumer: the role gets an access grant on the consumer and a trust grant
/// for the producer. Without one, the consumer itself admits the producer
/// through a resource-based grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowIntent {
    /// Resource emitting data
    pub producer: LogicalId,
    /// Resource receiving data
    pub consumer: LogicalId,
    /// Access the producer needs on the consumer
    pub access: Access,
    /// Role the producer acts as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<LogicalId>,
}

impl FlowIntent {
    /// Create a write flow from `producer` into `consumer`
    #[must_use]
    pub fn writes(producer: LogicalId, consumer: LogicalId) -> Self {
        Self {
            producer,
            consumer,
            access: Access::Write,
            role: None,
        }
    }

    /// Create an invoke flow from `producer` into `consumer`
    #[must_use]
    pub fn invokes(producer: LogicalId, consumer: LogicalId) -> Self {
        Self {
            producer,
            consumer,
            access: Access::Invoke,
            role: None,
        }
    }

    /// Set the access level
    #[must_use]
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Set the role the producer acts as
    #[must_use]
    pub fn via_role(mut self, role: LogicalId) -> Self {
        self.role = Some(role);
        self
    }
}
