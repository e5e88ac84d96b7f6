//! Core error types for STACKWRIGHT.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Invalid logical ID
    #[error("Invalid logical ID {id:?}: {reason}")]
    InvalidId {
        /// Offending input
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid ARN
    #[error("Invalid ARN {arn:?}: {reason}")]
    InvalidArn {
        /// Offending input
        arn: String,
        /// Why it was rejected
        reason: String,
    },

    /// Unknown resource kind or attribute name
    #[error("Unknown {what}: {value}")]
    Unknown {
        /// What was being parsed
        what: String,
        /// The unrecognised value
        value: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Field that failed
        field: String,
        /// Why it failed
        reason: String,
    },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError {
        /// Parser message
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}
