//! STACKWRIGHT Planner
//!
//! Turns declared resources and data-flow intents into a deterministic plan:
//! grants are synthesized and attached, identifiers known up front are
//! substituted, and the remaining references are ordered into batches of
//! independent resources.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dag;
pub mod error;
pub mod grants;
pub mod identifier;
pub mod pipeline;
pub mod planner;
pub mod resource;
pub mod stack;

pub use dag::{DependencyGraph, GraphBuilder};
pub use error::{PlanError, PlanResult};
pub use grants::{attach_grants, POLICY_DOCUMENT, RESOURCE_POLICY, TRUST_POLICY};
pub use identifier::{predict, IdentifierClass, IdentifierResolver};
pub use pipeline::{EventPipeline, FilterPattern};
pub use planner::{Batch, Plan, Planner};
pub use resource::{AttrRef, PropertyValue, ResourceSpec};
pub use stack::{build_plan, Stack};
