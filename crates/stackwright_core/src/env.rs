//! Deployment environment threaded through every identifier of a stack.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Partition, account and region of a stack
///
/// A stack has exactly one environment. Every ARN the planner renders is
/// derived from it, so account and region can never disagree between
/// resources of the same stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StackEnv {
    /// ARN partition (`aws`, `aws-cn`, ...)
    pub partition: String,
    /// Twelve digit account number
    pub account: String,
    /// Region code
    pub region: String,
}

impl StackEnv {
    /// Create a new environment
    ///
    /// # Errors
    ///
    /// Returns error if the environment fails validation
    pub fn new(
        partition: impl Into<String>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> CoreResult<Self> {
        let env = Self {
            partition: partition.into(),
            account: account.into(),
            region: region.into(),
        };
        env.validate()?;
        Ok(env)
    }

    /// Validate the environment
    ///
    /// # Errors
    ///
    /// Returns error if the account is not twelve digits or the partition
    /// or region is empty
    pub fn validate(&self) -> CoreResult<()> {
        if self.partition.is_empty() {
            return Err(CoreError::Validation {
                field: "partition".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.account.len() != 12 || !self.account.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::Validation {
                field: "account".to_string(),
                reason: format!("expected 12 digits, got {:?}", self.account),
            });
        }
        if self.region.is_empty() || self.region.contains(':') {
            return Err(CoreError::Validation {
                field: "region".to_string(),
                reason: format!("invalid region {:?}", self.region),
            });
        }
        Ok(())
    }
}

impl Default for StackEnv {
    fn default() -> Self {
        Self {
            partition: "aws".to_string(),
            account: "000000000000".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}
