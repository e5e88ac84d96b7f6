//! STACKWRIGHT Policy System
//!
//! Derives least-privilege permission grants from declared data-flow
//! intents and evaluates the policy documents they render into.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod document;
pub mod error;
pub mod grant;
pub mod intent;
pub mod matcher;
pub mod synthesizer;

pub use actions::{actions_for, wildcard_suffix, ASSUME_ROLE};
pub use document::{Effect, PolicyDocument, Principal, Statement, ARN_EQUALS, ARN_LIKE, POLICY_VERSION};
pub use error::{PolicyError, PolicyResult};
pub use grant::{GrantCondition, GrantKind, PermissionGrant, ResourcePattern, SOURCE_ARN_KEY};
pub use intent::{Access, FlowIntent};
pub use matcher::{glob_match, match_any, Matcher};
pub use synthesizer::PermissionSynthesizer;
