//! The remote system the engine applies changes against.
//!
//! A provider creates, updates and deletes single resources. It must be
//! idempotent: applying an unchanged configuration again returns the same
//! attributes without side effects.

use crate::resolved::Attributes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_core::{LogicalId, ResourceKind};

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Throttling or temporary unavailability; worth retrying
    Transient,
    /// The caller lacks permission
    PermissionDenied,
    /// The request conflicts with existing remote state
    Conflict,
    /// The resource does not exist
    NotFound,
    /// Anything else
    Unknown,
}

impl ErrorClass {
    /// Whether failures of this class are retried
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::PermissionDenied => "permission denied",
            Self::Conflict => "conflict",
            Self::NotFound => "not found",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Failure reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{class}: {message}")]
pub struct ProviderError {
    /// Classification
    pub class: ErrorClass,
    /// Provider message
    pub message: String,
}

impl ProviderError {
    /// Create a new provider error
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Transient failure
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    /// Permission failure
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PermissionDenied, message)
    }

    /// Conflicting state
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Conflict, message)
    }

    /// Missing resource
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }

    /// Whether the engine retries this failure
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }
}

/// A create-or-update call with every reference substituted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Resource being applied
    pub logical_id: LogicalId,
    /// Its kind
    pub kind: ResourceKind,
    /// Fully resolved configuration
    pub config: serde_json::Value,
}

/// Remote system capability consumed by the apply engine
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create the resource, or bring it in line with `request.config`
    async fn create_or_update(&self, request: &ProviderRequest) -> Result<Attributes, ProviderError>;

    /// Delete a previously created resource
    async fn delete(&self, kind: ResourceKind, attributes: &Attributes) -> Result<(), ProviderError>;
}
