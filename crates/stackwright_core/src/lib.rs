//! STACKWRIGHT Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! All types are serializable and ordered for deterministic planning.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arn;
pub mod env;
pub mod error;
pub mod id;
pub mod kind;

// Re-exports
pub use arn::Arn;
pub use env::StackEnv;
pub use error::{CoreError, CoreResult};
pub use id::{LogicalId, RunId};
pub use kind::{Attribute, ResourceKind};
