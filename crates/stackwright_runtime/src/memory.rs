//! In-memory provider.
//!
//! Behaves like a well-mannered remote system: physical names are derived
//! deterministically when the configuration does not supply one, unchanged
//! configurations are no-ops, and names are unique per kind. Faults and
//! latency can be injected per resource to exercise the engine.

use crate::provider::{ErrorClass, Provider, ProviderError, ProviderRequest};
use crate::resolved::Attributes;
use async_trait::async_trait;
use stackwright_core::{Arn, Attribute, LogicalId, ResourceKind, StackEnv};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Fault injected into calls for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every call fails with this class
    Fail(ErrorClass),
    /// The next `times` calls fail with `class`, later calls succeed
    FailTimes {
        /// Error class
        class: ErrorClass,
        /// Calls left to fail
        times: u32,
    },
    /// Every call is delayed before it is handled
    Delay(Duration),
}

/// A call received by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// Create or update of a logical resource
    CreateOrUpdate(LogicalId),
    /// Delete by physical name
    Delete {
        /// Kind deleted
        kind: ResourceKind,
        /// Physical name deleted
        name: String,
    },
}

/// A resource held by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    /// Logical resource that owns it
    pub logical_id: LogicalId,
    /// Kind
    pub kind: ResourceKind,
    /// Last applied configuration
    pub config: serde_json::Value,
    /// Assigned attributes
    pub attributes: Attributes,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<LogicalId, StoredResource>,
    faults: HashMap<LogicalId, Fault>,
    calls: Vec<ProviderCall>,
}

impl State {
    /// Fault to apply to the current call, consuming counted faults
    fn take_fault(&mut self, id: &LogicalId) -> Option<Fault> {
        let fault = self.faults.get_mut(id)?;
        match fault {
            Fault::FailTimes { times: 0, .. } => {
                self.faults.remove(id);
                None
            }
            Fault::FailTimes { class, times } => {
                let class = *class;
                *times -= 1;
                if *times == 0 {
                    self.faults.remove(id);
                }
                Some(Fault::Fail(class))
            }
            other => Some(*other),
        }
    }
}

/// Decrements the in-flight counter when a call ends
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Provider that keeps every resource in memory
#[derive(Debug)]
pub struct InMemoryProvider {
    env: StackEnv,
    latency: Duration,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryProvider {
    /// Create a provider for `env`
    #[must_use]
    pub fn new(env: StackEnv) -> Self {
        Self {
            env,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inject a fault for calls about `id`
    pub async fn inject(&self, id: LogicalId, fault: Fault) {
        self.state.lock().await.faults.insert(id, fault);
    }

    /// Remove the fault for `id`
    pub async fn clear_fault(&self, id: &LogicalId) {
        self.state.lock().await.faults.remove(id);
    }

    /// Calls received so far, in arrival order
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    /// Create-or-update calls received for `id`
    pub async fn calls_for(&self, id: &LogicalId) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| matches!(call, ProviderCall::CreateOrUpdate(c) if c == id))
            .count()
    }

    /// Resource currently held for `id`
    pub async fn resource(&self, id: &LogicalId) -> Option<StoredResource> {
        self.state.lock().await.resources.get(id).cloned()
    }

    /// Number of resources currently held
    pub async fn resource_count(&self) -> usize {
        self.state.lock().await.resources.len()
    }

    /// Most calls that were ever in flight at once
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Name assigned when the configuration does not supply one
    #[must_use]
    pub fn generated_name(id: &LogicalId, kind: ResourceKind) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(id.as_str().as_bytes());
        hasher.update(kind.kind_name().as_bytes());
        let digest = hasher.finalize().to_hex();
        format!("{}-{}", id.as_str().to_lowercase(), &digest[..8])
    }

    fn attributes_for(&self, kind: ResourceKind, name: &str) -> Attributes {
        let mut attributes = Attributes::new().with(Attribute::Name, name);
        if let Some(arn) = Arn::for_resource(&self.env, kind, name) {
            attributes.insert(Attribute::Arn, arn.to_string());
        }
        if kind.supports(Attribute::Endpoint) {
            attributes.insert(
                Attribute::Endpoint,
                format!("https://{}.{}.amazonaws.com/{}", kind.service(), self.env.region, name),
            );
        }
        attributes
    }

    async fn pause(&self, fault: Option<Fault>) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(Fault::Delay(delay)) = fault {
            tokio::time::sleep(delay).await;
        }
    }
}

fn injected(fault: Option<Fault>, what: &str) -> Result<(), ProviderError> {
    match fault {
        Some(Fault::Fail(class)) => Err(ProviderError::new(class, format!("injected failure for {}", what))),
        _ => Ok(()),
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn create_or_update(&self, request: &ProviderRequest) -> Result<Attributes, ProviderError> {
        let _guard = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        let id = &request.logical_id;

        let fault = {
            let mut state = self.state.lock().await;
            state.calls.push(ProviderCall::CreateOrUpdate(id.clone()));
            state.take_fault(id)
        };
        self.pause(fault).await;
        injected(fault, id.as_str())?;

        let mut state = self.state.lock().await;
        let existing = state.resources.get(id);
        if let Some(existing) = existing {
            if existing.kind == request.kind && existing.config == request.config {
                return Ok(existing.attributes.clone());
            }
        }

        let requested = request
            .config
            .get(request.kind.name_property())
            .and_then(serde_json::Value::as_str);
        let name = match (requested, existing) {
            (Some(name), _) => name.to_string(),
            (None, Some(existing)) if existing.kind == request.kind => existing
                .attributes
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| Self::generated_name(id, request.kind)),
            (None, _) => Self::generated_name(id, request.kind),
        };

        let taken = state.resources.values().any(|r| {
            &r.logical_id != id && r.kind == request.kind && r.attributes.name() == Some(name.as_str())
        });
        if taken {
            return Err(ProviderError::conflict(format!(
                "{} named {} already exists",
                request.kind, name
            )));
        }

        let attributes = self.attributes_for(request.kind, &name);
        state.resources.insert(
            id.clone(),
            StoredResource {
                logical_id: id.clone(),
                kind: request.kind,
                config: request.config.clone(),
                attributes: attributes.clone(),
            },
        );
        Ok(attributes)
    }

    async fn delete(&self, kind: ResourceKind, attributes: &Attributes) -> Result<(), ProviderError> {
        let _guard = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        let Some(name) = attributes.name() else {
            return Err(ProviderError::new(ErrorClass::Unknown, "delete without a name"));
        };

        let (owner, fault) = {
            let mut state = self.state.lock().await;
            state.calls.push(ProviderCall::Delete {
                kind,
                name: name.to_string(),
            });
            let owner = state
                .resources
                .values()
                .find(|r| r.kind == kind && r.attributes.name() == Some(name))
                .map(|r| r.logical_id.clone());
            let fault = owner.as_ref().and_then(|id| state.take_fault(id));
            (owner, fault)
        };
        self.pause(fault).await;

        let Some(owner) = owner else {
            return Err(ProviderError::not_found(format!("{} named {} does not exist", kind, name)));
        };
        injected(fault, owner.as_str())?;
        self.state.lock().await.resources.remove(&owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn request(name: &str, kind: ResourceKind, config: serde_json::Value) -> ProviderRequest {
        ProviderRequest {
            logical_id: id(name),
            kind,
            config,
        }
    }

    #[tokio::test]
    async fn test_generated_name_is_stable() {
        let provider = InMemoryProvider::new(StackEnv::default());
        let req = request("Archive", ResourceKind::StorageBucket, json!({}));
        let first = provider.create_or_update(&req).await.unwrap();
        let second = provider.create_or_update(&req).await.unwrap();

        assert_eq!(first, second);
        let name = first.name().unwrap();
        assert!(name.starts_with("archive-"));
        assert_eq!(name.len(), "archive-".len() + 8);
        assert_eq!(first.arn(), Some(format!("arn:aws:s3:::{}", name).as_str()));
        assert_eq!(provider.resource_count().await, 1);
    }

    #[tokio::test]
    async fn test_explicit_name_and_endpoint() {
        let provider = InMemoryProvider::new(StackEnv::default());
        let attrs = provider
            .create_or_update(&request(
                "Handler",
                ResourceKind::ComputeFunction,
                json!({"function_name": "app-handler"}),
            ))
            .await
            .unwrap();
        assert_eq!(attrs.name(), Some("app-handler"));
        assert_eq!(
            attrs.arn(),
            Some("arn:aws:lambda:us-east-1:000000000000:function:app-handler")
        );
        assert_eq!(
            attrs.get(Attribute::Endpoint),
            Some("https://lambda.us-east-1.amazonaws.com/app-handler")
        );
    }

    #[tokio::test]
    async fn test_update_keeps_generated_name() {
        let provider = InMemoryProvider::new(StackEnv::default());
        let first = provider
            .create_or_update(&request("Logs", ResourceKind::LogSink, json!({"retention_in_days": 7})))
            .await
            .unwrap();
        let second = provider
            .create_or_update(&request("Logs", ResourceKind::LogSink, json!({"retention_in_days": 14})))
            .await
            .unwrap();
        assert_eq!(first.name(), second.name());
        assert_eq!(
            provider.resource(&id("Logs")).await.unwrap().config,
            json!({"retention_in_days": 14})
        );
    }

    #[tokio::test]
    async fn test_name_conflict() {
        let provider = InMemoryProvider::new(StackEnv::default());
        let config = json!({"bucket_name": "shared"});
        provider
            .create_or_update(&request("A", ResourceKind::StorageBucket, config.clone()))
            .await
            .unwrap();
        let err = provider
            .create_or_update(&request("B", ResourceKind::StorageBucket, config))
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Conflict);
    }

    #[tokio::test]
    async fn test_fail_times_then_succeeds() {
        let provider = InMemoryProvider::new(StackEnv::default());
        provider
            .inject(
                id("Role"),
                Fault::FailTimes {
                    class: ErrorClass::Transient,
                    times: 2,
                },
            )
            .await;
        let req = request("Role", ResourceKind::Role, json!({}));

        assert_eq!(provider.create_or_update(&req).await.unwrap_err().class, ErrorClass::Transient);
        assert_eq!(provider.create_or_update(&req).await.unwrap_err().class, ErrorClass::Transient);
        assert!(provider.create_or_update(&req).await.is_ok());
        assert_eq!(provider.calls_for(&id("Role")).await, 3);
    }

    #[tokio::test]
    async fn test_fail_times_zero_never_fails() {
        let provider = InMemoryProvider::new(StackEnv::default());
        provider
            .inject(
                id("Role"),
                Fault::FailTimes {
                    class: ErrorClass::PermissionDenied,
                    times: 0,
                },
            )
            .await;
        let req = request("Role", ResourceKind::Role, json!({}));

        assert!(provider.create_or_update(&req).await.is_ok());
        assert!(provider.create_or_update(&req).await.is_ok());
        assert_eq!(provider.calls_for(&id("Role")).await, 2);
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let provider = InMemoryProvider::new(StackEnv::default());
        let attrs = provider
            .create_or_update(&request("Role", ResourceKind::Role, json!({})))
            .await
            .unwrap();

        provider.delete(ResourceKind::Role, &attrs).await.unwrap();
        assert_eq!(provider.resource_count().await, 0);

        let err = provider.delete(ResourceKind::Role, &attrs).await.unwrap_err();
        assert_eq!(err.class, ErrorClass::NotFound);
    }
}
