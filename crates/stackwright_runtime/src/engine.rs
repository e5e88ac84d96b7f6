//! Batch-parallel apply engine.
//!
//! Batches run strictly in plan order. Within a batch every member's
//! configuration is rendered against the resources resolved so far, then
//! handed to the provider on a bounded pool of workers. The batch loop is
//! the only writer of the [`ResolvedMap`]: workers return their outcomes and
//! the loop records them once the whole batch has drained. Any failure stops
//! the run before the next batch; nothing is rolled back.

use crate::config::ApplyConfig;
use crate::error::{ApplyError, ApplyResult, CallError, ResourceFailure};
use crate::monitor::{ApplyMetrics, ApplyMonitor};
use crate::provider::{ErrorClass, Provider, ProviderError, ProviderRequest};
use crate::resolved::{ResolvedMap, ResolvedResource};
use crate::retry::RetryPolicy;
use stackwright_core::{LogicalId, RunId};
use stackwright_plan::{Plan, ResourceSpec};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How one resource's call sequence ended
enum CallOutcome<T> {
    /// The provider succeeded
    Done { value: T, attempts: u32 },
    /// The provider failed for good, or the call timed out
    Failed { error: CallError, attempts: u32 },
    /// Cancelled before the first call
    NotStarted,
    /// Cancelled while backing off before a retry
    Interrupted { error: ProviderError, attempts: u32 },
}

/// Everything a worker needs besides the call itself
#[derive(Clone)]
struct CallContext {
    policy: RetryPolicy,
    timeout_ms: u64,
    cancel: CancellationToken,
    monitor: Arc<ApplyMonitor>,
    workers: Arc<Semaphore>,
}

impl CallContext {
    /// Run `call` on a worker slot with timeout and retry
    async fn run<T, F, Fut>(&self, id: &LogicalId, mut call: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let _permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return CallOutcome::NotStarted,
            permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return CallOutcome::NotStarted,
            },
        };
        if self.cancel.is_cancelled() {
            return CallOutcome::NotStarted;
        }

        let timeout = Duration::from_millis(self.timeout_ms);
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.monitor.record_call(attempts);
            tracing::debug!(resource = %id, attempt = attempts, "provider call");

            let error = match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(value)) => return CallOutcome::Done { value, attempts },
                Ok(Err(error)) => error,
                Err(_) => {
                    self.monitor.record_timeout();
                    return CallOutcome::Failed {
                        error: CallError::Timeout {
                            timeout_ms: self.timeout_ms,
                        },
                        attempts,
                    };
                }
            };

            if !self.policy.should_retry(&error, attempts) {
                return CallOutcome::Failed {
                    error: error.into(),
                    attempts,
                };
            }

            let delay = self.policy.delay_for(attempts);
            tracing::warn!(
                resource = %id,
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "transient provider error, retrying"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return CallOutcome::Interrupted { error, attempts },
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Apply engine
///
/// Cheap to share: the provider is reference counted and metrics are kept in
/// atomic counters.
pub struct ApplyEngine {
    /// Remote system
    provider: Arc<dyn Provider>,
    /// Configuration
    config: ApplyConfig,
    /// Metric counters, accumulated across runs
    monitor: Arc<ApplyMonitor>,
}

impl ApplyEngine {
    /// Create an engine with the default configuration
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            config: ApplyConfig::default(),
            monitor: Arc::new(ApplyMonitor::new()),
        }
    }

    /// Set the configuration
    #[must_use]
    pub fn with_config(mut self, config: ApplyConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &ApplyConfig {
        &self.config
    }

    /// Metrics accumulated by every run of this engine
    #[must_use]
    pub fn metrics(&self) -> ApplyMetrics {
        self.monitor.snapshot()
    }

    /// Apply every batch of `plan`
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::BatchFailure`] when a batch member fails and
    /// [`ApplyError::Internal`] when a reference cannot be resolved
    pub async fn apply(&self, plan: &Plan) -> ApplyResult<ResolvedMap> {
        self.apply_with_cancel(plan, CancellationToken::new()).await
    }

    /// Apply `plan`, stopping early once `cancel` fires
    ///
    /// # Errors
    ///
    /// As [`ApplyEngine::apply`], plus [`ApplyError::Cancelled`]
    pub async fn apply_with_cancel(&self, plan: &Plan, cancel: CancellationToken) -> ApplyResult<ResolvedMap> {
        self.resume_with_cancel(plan, ResolvedMap::new(), cancel).await
    }

    /// Apply `plan`, reusing resources a previous run already resolved
    ///
    /// A previously resolved resource is reused when its spec and its
    /// rendered configuration are both unchanged; everything else goes to
    /// the provider.
    ///
    /// # Errors
    ///
    /// As [`ApplyEngine::apply`]
    pub async fn resume(&self, plan: &Plan, previous: ResolvedMap) -> ApplyResult<ResolvedMap> {
        self.resume_with_cancel(plan, previous, CancellationToken::new()).await
    }

    /// [`ApplyEngine::resume`] with cancellation
    ///
    /// # Errors
    ///
    /// As [`ApplyEngine::apply_with_cancel`]
    pub async fn resume_with_cancel(
        &self,
        plan: &Plan,
        previous: ResolvedMap,
        cancel: CancellationToken,
    ) -> ApplyResult<ResolvedMap> {
        let run_id = RunId::new();
        let span = tracing::info_span!("apply", run = %run_id);
        self.run_batches(plan, previous, cancel).instrument(span).await
    }

    /// Delete every resolved resource of `plan`, in reverse batch order
    ///
    /// Resources the provider no longer knows count as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::BatchFailure`] carrying the resources still in
    /// place when a delete fails
    pub async fn destroy(&self, plan: &Plan, resolved: ResolvedMap) -> ApplyResult<()> {
        self.destroy_with_cancel(plan, resolved, CancellationToken::new()).await
    }

    /// [`ApplyEngine::destroy`] with cancellation
    ///
    /// # Errors
    ///
    /// As [`ApplyEngine::destroy`], plus [`ApplyError::Cancelled`]
    pub async fn destroy_with_cancel(
        &self,
        plan: &Plan,
        resolved: ResolvedMap,
        cancel: CancellationToken,
    ) -> ApplyResult<()> {
        let run_id = RunId::new();
        let span = tracing::info_span!("destroy", run = %run_id);
        self.delete_batches(plan, resolved, cancel).instrument(span).await
    }

    fn call_context(&self, cancel: &CancellationToken) -> CallContext {
        CallContext {
            policy: self.config.retry.clone(),
            timeout_ms: self.config.call_timeout_ms,
            cancel: cancel.clone(),
            monitor: Arc::clone(&self.monitor),
            workers: Arc::new(Semaphore::new(self.config.workers())),
        }
    }

    async fn run_batches(
        &self,
        plan: &Plan,
        previous: ResolvedMap,
        cancel: CancellationToken,
    ) -> ApplyResult<ResolvedMap> {
        let started = Instant::now();
        let ctx = self.call_context(&cancel);
        let mut resolved = ResolvedMap::new();

        tracing::info!(
            resources = plan.len(),
            batches = plan.batches().len(),
            previous = previous.len(),
            "apply started"
        );

        for batch in plan.batches() {
            if cancel.is_cancelled() {
                tracing::warn!(batch = batch.index, resolved = resolved.len(), "apply cancelled");
                return Err(ApplyError::Cancelled { resolved });
            }

            // Render every request before any call so an inconsistency
            // never leaves calls behind
            let mut requests: Vec<(ResourceSpec, ProviderRequest)> = Vec::with_capacity(batch.len());
            let mut reused = 0usize;
            for id in &batch.members {
                let Some(spec) = plan.spec(id) else {
                    return Err(ApplyError::Internal {
                        id: Some(id.clone()),
                        reason: "batch member has no spec".to_string(),
                        resolved,
                    });
                };

                let config = match spec.render_config(|r| resolved.lookup(r)) {
                    Ok(config) => config,
                    Err(missing) => {
                        return Err(ApplyError::Internal {
                            id: Some(id.clone()),
                            reason: format!("unresolved reference {}", missing),
                            resolved,
                        });
                    }
                };

                // A dependency replaced in this run changes the rendered
                // config even when the spec itself is unchanged
                if let Some(prior) = previous
                    .get(id)
                    .filter(|prior| prior.spec == *spec && prior.config == config)
                {
                    tracing::debug!(resource = %id, "reusing resource from previous run");
                    resolved.insert(prior.clone());
                    self.monitor.record_reused();
                    reused += 1;
                    continue;
                }

                let request = ProviderRequest {
                    logical_id: id.clone(),
                    kind: spec.kind,
                    config,
                };
                requests.push((spec.clone(), request));
            }

            tracing::info!(
                batch = batch.index,
                members = batch.len(),
                calls = requests.len(),
                reused,
                "batch started"
            );

            let mut tasks = JoinSet::new();
            for (spec, request) in requests {
                let provider = Arc::clone(&self.provider);
                let ctx = ctx.clone();
                tasks.spawn(async move {
                    let outcome = ctx
                        .run(&request.logical_id, || provider.create_or_update(&request))
                        .await;
                    (spec, request.config, outcome)
                });
            }

            let mut outcomes = Vec::with_capacity(tasks.len());
            let mut crashed = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => crashed = Some(e.to_string()),
                }
            }
            outcomes.sort_by(|a, b| a.0.id.cmp(&b.0.id));

            let mut failures = Vec::new();
            let mut interrupted = false;
            for (spec, config, outcome) in outcomes {
                match outcome {
                    CallOutcome::Done { value, attempts } => {
                        tracing::debug!(resource = %spec.id, attempts, "resource applied");
                        self.monitor.record_applied();
                        resolved.insert(ResolvedResource {
                            spec,
                            config,
                            attributes: value,
                        });
                    }
                    CallOutcome::Failed { error, attempts } => {
                        tracing::error!(resource = %spec.id, attempts, error = %error, "resource failed");
                        self.monitor.record_failure();
                        failures.push(ResourceFailure {
                            id: spec.id,
                            error,
                            attempts,
                        });
                    }
                    CallOutcome::Interrupted { error, attempts } => {
                        tracing::warn!(resource = %spec.id, attempts, error = %error, "retry abandoned on cancellation");
                        interrupted = true;
                    }
                    CallOutcome::NotStarted => interrupted = true,
                }
            }

            if let Some(reason) = crashed {
                return Err(ApplyError::Internal {
                    id: None,
                    reason: format!("worker task failed: {}", reason),
                    resolved,
                });
            }
            if !failures.is_empty() {
                tracing::error!(batch = batch.index, failed = failures.len(), "batch failed");
                return Err(ApplyError::BatchFailure {
                    batch_index: batch.index,
                    failures,
                    resolved,
                });
            }
            if interrupted {
                tracing::warn!(batch = batch.index, resolved = resolved.len(), "apply cancelled");
                return Err(ApplyError::Cancelled { resolved });
            }

            tracing::info!(batch = batch.index, resolved = resolved.len(), "batch finished");
        }

        tracing::info!(
            resolved = resolved.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "apply finished"
        );
        Ok(resolved)
    }

    async fn delete_batches(
        &self,
        plan: &Plan,
        mut remaining: ResolvedMap,
        cancel: CancellationToken,
    ) -> ApplyResult<()> {
        let ctx = self.call_context(&cancel);
        tracing::info!(resources = remaining.len(), "destroy started");

        for batch in plan.batches().iter().rev() {
            if cancel.is_cancelled() {
                tracing::warn!(batch = batch.index, remaining = remaining.len(), "destroy cancelled");
                return Err(ApplyError::Cancelled { resolved: remaining });
            }

            let mut tasks = JoinSet::new();
            for id in &batch.members {
                let Some(resource) = remaining.get(id) else {
                    continue;
                };
                let provider = Arc::clone(&self.provider);
                let ctx = ctx.clone();
                let id = id.clone();
                let kind = resource.kind();
                let attributes = resource.attributes.clone();
                tasks.spawn(async move {
                    let outcome = ctx.run(&id, || provider.delete(kind, &attributes)).await;
                    (id, outcome)
                });
            }
            if tasks.is_empty() {
                continue;
            }
            tracing::info!(batch = batch.index, deletes = tasks.len(), "destroying batch");

            let mut outcomes = Vec::with_capacity(tasks.len());
            let mut crashed = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => crashed = Some(e.to_string()),
                }
            }
            outcomes.sort_by(|a, b| a.0.cmp(&b.0));

            let mut failures = Vec::new();
            let mut interrupted = false;
            for (id, outcome) in outcomes {
                match outcome {
                    CallOutcome::Done { .. } => {
                        tracing::debug!(resource = %id, "resource deleted");
                        self.monitor.record_deleted();
                        remaining.remove(&id);
                    }
                    CallOutcome::Failed {
                        error: CallError::Provider(ProviderError { class: ErrorClass::NotFound, .. }),
                        ..
                    } => {
                        tracing::debug!(resource = %id, "resource already gone");
                        self.monitor.record_deleted();
                        remaining.remove(&id);
                    }
                    CallOutcome::Failed { error, attempts } => {
                        tracing::error!(resource = %id, attempts, error = %error, "delete failed");
                        self.monitor.record_failure();
                        failures.push(ResourceFailure { id, error, attempts });
                    }
                    CallOutcome::Interrupted { .. } | CallOutcome::NotStarted => interrupted = true,
                }
            }

            if let Some(reason) = crashed {
                return Err(ApplyError::Internal {
                    id: None,
                    reason: format!("worker task failed: {}", reason),
                    resolved: remaining,
                });
            }
            if !failures.is_empty() {
                return Err(ApplyError::BatchFailure {
                    batch_index: batch.index,
                    failures,
                    resolved: remaining,
                });
            }
            if interrupted {
                return Err(ApplyError::Cancelled { resolved: remaining });
            }
        }

        if !remaining.is_empty() {
            tracing::warn!(
                leftover = remaining.len(),
                "resolved resources not in plan were left in place"
            );
        }
        tracing::info!("destroy finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryProvider;
    use stackwright_core::{ResourceKind, StackEnv};
    use stackwright_plan::build_plan;

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn engine(provider: &Arc<InMemoryProvider>) -> ApplyEngine {
        let provider: Arc<dyn Provider> = provider.clone();
        ApplyEngine::new(provider).with_config(
            ApplyConfig::default()
                .with_call_timeout_ms(1_000)
                .with_retry(RetryPolicy::default().with_base_delay_ms(1)),
        )
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let provider = Arc::new(InMemoryProvider::new(StackEnv::default()));
        let plan = build_plan([]).unwrap();
        let resolved = engine(&provider).apply(&plan).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_single_batch_applies_all() {
        let provider = Arc::new(InMemoryProvider::new(StackEnv::default()));
        let plan = build_plan([
            ResourceSpec::new(id("A"), ResourceKind::Role),
            ResourceSpec::new(id("B"), ResourceKind::StorageBucket).with_name("b"),
        ])
        .unwrap();

        let engine = engine(&provider);
        let resolved = engine.apply(&plan).await.unwrap();
        assert_eq!(resolved.ids().map(LogicalId::as_str).collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(resolved.get(&id("B")).unwrap().attributes.name(), Some("b"));

        let metrics = engine.metrics();
        assert_eq!(metrics.calls, 2);
        assert_eq!(metrics.applied, 2);
        assert_eq!(metrics.retries, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let provider = Arc::new(InMemoryProvider::new(StackEnv::default()));
        let plan = build_plan([ResourceSpec::new(id("A"), ResourceKind::Role)]).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine(&provider).apply_with_cancel(&plan, cancel).await.unwrap_err();
        assert!(matches!(err, ApplyError::Cancelled { ref resolved } if resolved.is_empty()));
        assert!(provider.calls().await.is_empty());
    }
}
