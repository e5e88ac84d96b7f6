//! STACKWRIGHT Runtime
//!
//! Applies a plan against a provider, one batch at a time, with bounded
//! parallelism inside each batch. Handles per-call timeouts, retry of
//! transient failures, cancellation, resume and destroy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod provider;
pub mod resolved;
pub mod retry;

pub use config::ApplyConfig;
pub use engine::ApplyEngine;
pub use error::{ApplyError, ApplyResult, CallError, ResourceFailure};
pub use memory::{Fault, InMemoryProvider, ProviderCall, StoredResource};
pub use monitor::{ApplyMetrics, ApplyMonitor};
pub use provider::{ErrorClass, Provider, ProviderError, ProviderRequest};
pub use resolved::{Attributes, ResolvedMap, ResolvedResource};
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
