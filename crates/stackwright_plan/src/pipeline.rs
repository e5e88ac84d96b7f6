//! The canonical event pipeline.
//!
//! A log group whose error lines are forwarded by a subscription filter to a
//! compute handler, optionally with a durable branch: a second filter
//! forwarding into a delivery stream that buffers into a storage bucket.
//! Every cross-resource permission is derived from flow intents.

use crate::error::PlanResult;
use crate::resource::{AttrRef, PropertyValue, ResourceSpec};
use crate::stack::Stack;
use serde::{Deserialize, Serialize};
use stackwright_core::{LogicalId, ResourceKind, StackEnv};
use stackwright_policy::FlowIntent;

/// Log group
pub const LOG_GROUP: &str = "LogGroup";
/// Compute handler
pub const HANDLER: &str = "Handler";
/// Filter forwarding to the handler
pub const SUBSCRIPTION: &str = "Subscription";
/// Archive bucket
pub const ARCHIVE_BUCKET: &str = "ArchiveBucket";
/// Role the delivery stream writes the bucket as
pub const DELIVERY_ROLE: &str = "DeliveryRole";
/// Buffered delivery stream
pub const ARCHIVE_STREAM: &str = "ArchiveStream";
/// Role the log service writes the stream as
pub const SUBSCRIPTION_ROLE: &str = "SubscriptionRole";
/// Filter forwarding to the delivery stream
pub const ARCHIVE_SUBSCRIPTION: &str = "ArchiveSubscription";

/// Default log retention
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
/// Default handler runtime
pub const DEFAULT_RUNTIME: &str = "python3.7";
/// Default handler entry point
pub const DEFAULT_HANDLER: &str = "hello.handler";
/// Default handler code asset
pub const DEFAULT_CODE_PATH: &str = "./lambda";
/// Default handler timeout
pub const DEFAULT_TIMEOUT_SECS: i64 = 60;

/// Which log events a subscription forwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "terms")]
pub enum FilterPattern {
    /// Every event
    AllEvents,
    /// Events containing every term
    AllTerms(Vec<String>),
    /// Events containing at least one term
    AnyTerm(Vec<String>),
    /// Pattern text passed through unchanged
    Literal(String),
}

impl FilterPattern {
    /// Events containing every term
    #[must_use]
    pub fn all_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllTerms(terms.into_iter().map(Into::into).collect())
    }

    /// Events containing at least one term
    #[must_use]
    pub fn any_term<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyTerm(terms.into_iter().map(Into::into).collect())
    }

    /// Render in the log service's filter syntax
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::AllEvents => String::new(),
            Self::AllTerms(terms) => terms.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" "),
            Self::AnyTerm(terms) => terms
                .iter()
                .map(|t| format!("?{}", quote(t)))
                .collect::<Vec<_>>()
                .join(" "),
            Self::Literal(text) => text.clone(),
        }
    }

    /// Whether a log line would be forwarded
    ///
    /// Literal patterns match lines containing their text verbatim.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::AllEvents => true,
            Self::AllTerms(terms) => terms.iter().all(|t| line.contains(t.as_str())),
            Self::AnyTerm(terms) => terms.iter().any(|t| line.contains(t.as_str())),
            Self::Literal(text) => line.contains(text.as_str()),
        }
    }
}

impl std::fmt::Display for FilterPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\\\""))
}

/// Builder for the canonical event pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPipeline {
    /// Prefix for caller-supplied names; `None` leaves names to the provider
    name_prefix: Option<String>,
    /// Log retention in days
    retention_days: i64,
    /// Subscription filter
    filter: FilterPattern,
    /// Handler runtime
    runtime: String,
    /// Handler entry point
    handler: String,
    /// Handler code asset
    code_path: String,
    /// Handler timeout in seconds
    timeout_secs: i64,
    /// Whether to add the durable archive branch
    archive: bool,
}

impl EventPipeline {
    /// Pipeline with the default settings and provider-assigned names
    #[must_use]
    pub fn new() -> Self {
        Self {
            name_prefix: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            filter: FilterPattern::all_terms(["ERROR", "MainThread"]),
            runtime: DEFAULT_RUNTIME.to_string(),
            handler: DEFAULT_HANDLER.to_string(),
            code_path: DEFAULT_CODE_PATH.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            archive: false,
        }
    }

    /// Supply physical names derived from `prefix`
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Set log retention
    #[must_use]
    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// Set the subscription filter
    #[must_use]
    pub fn with_filter(mut self, filter: FilterPattern) -> Self {
        self.filter = filter;
        self
    }

    /// Set the handler runtime, entry point and code asset
    #[must_use]
    pub fn with_handler(
        mut self,
        runtime: impl Into<String>,
        handler: impl Into<String>,
        code_path: impl Into<String>,
    ) -> Self {
        self.runtime = runtime.into();
        self.handler = handler.into();
        self.code_path = code_path.into();
        self
    }

    /// Set the handler timeout
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: i64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Add the durable archive branch
    #[must_use]
    pub fn with_archive(mut self) -> Self {
        self.archive = true;
        self
    }

    /// Get the subscription filter
    #[must_use]
    pub fn filter(&self) -> &FilterPattern {
        &self.filter
    }

    /// Declare the stack
    ///
    /// # Errors
    ///
    /// Returns error if `env` is invalid
    pub fn stack(&self, env: StackEnv) -> PlanResult<Stack> {
        env.validate()?;

        let log_group = LogicalId::new(LOG_GROUP)?;
        let handler = LogicalId::new(HANDLER)?;

        let mut stack = Stack::new(env)
            .with_resource(
                self.spec(log_group.clone(), ResourceKind::LogSink, "logs")
                    .with_property("retention_in_days", self.retention_days),
            )
            .with_resource(
                self.spec(handler.clone(), ResourceKind::ComputeFunction, "handler")
                    .with_property("runtime", self.runtime.as_str())
                    .with_property("handler", self.handler.as_str())
                    .with_property("code_path", self.code_path.as_str())
                    .with_property("timeout_seconds", self.timeout_secs),
            )
            .with_resource(
                self.spec(LogicalId::new(SUBSCRIPTION)?, ResourceKind::EventFilter, "errors")
                    .with_property("log_group_name", AttrRef::name(log_group.clone()))
                    .with_property("filter_pattern", self.filter.render())
                    .with_property("destination_arn", AttrRef::arn(handler.clone()))
                    .with_reference(log_group.clone())
                    .with_reference(handler.clone()),
            )
            .with_intent(FlowIntent::invokes(log_group.clone(), handler));

        if self.archive {
            let bucket = LogicalId::new(ARCHIVE_BUCKET)?;
            let delivery_role = LogicalId::new(DELIVERY_ROLE)?;
            let archive_stream = LogicalId::new(ARCHIVE_STREAM)?;
            let subscription_role = LogicalId::new(SUBSCRIPTION_ROLE)?;

            stack = stack
                .with_resource(self.spec(bucket.clone(), ResourceKind::StorageBucket, "archive"))
                .with_resource(self.spec(delivery_role.clone(), ResourceKind::Role, "delivery"))
                .with_resource(
                    self.spec(archive_stream.clone(), ResourceKind::DeliveryStream, "archive-stream")
                        .with_property("bucket_arn", AttrRef::arn(bucket.clone()))
                        .with_property("role_arn", AttrRef::arn(delivery_role.clone()))
                        .with_property("compression", "GZIP")
                        .with_property(
                            "buffering",
                            PropertyValue::map([
                                ("interval_seconds", PropertyValue::Integer(300)),
                                ("size_mb", PropertyValue::Integer(5)),
                            ]),
                        )
                        .with_reference(bucket.clone())
                        .with_reference(delivery_role.clone()),
                )
                .with_resource(self.spec(subscription_role.clone(), ResourceKind::Role, "subscription"))
                .with_resource(
                    self.spec(LogicalId::new(ARCHIVE_SUBSCRIPTION)?, ResourceKind::EventFilter, "archive-filter")
                        .with_property("log_group_name", AttrRef::name(log_group.clone()))
                        .with_property("filter_pattern", self.filter.render())
                        .with_property("destination_arn", AttrRef::arn(archive_stream.clone()))
                        .with_property("role_arn", AttrRef::arn(subscription_role.clone()))
                        .with_reference(log_group.clone())
                        .with_reference(archive_stream.clone())
                        .with_reference(subscription_role.clone()),
                )
                .with_intent(FlowIntent::writes(archive_stream.clone(), bucket).via_role(delivery_role))
                .with_intent(FlowIntent::writes(log_group, archive_stream).via_role(subscription_role));
        }

        Ok(stack)
    }

    /// Spec named `{prefix}-{suffix}` when names are caller-supplied
    fn spec(&self, id: LogicalId, kind: ResourceKind, suffix: &str) -> ResourceSpec {
        let spec = ResourceSpec::new(id, kind);
        match &self.name_prefix {
            Some(prefix) => spec.with_name(format!("{}-{}", prefix, suffix)),
            None => spec,
        }
    }
}

impl Default for EventPipeline {
    fn default() -> Self {
        Self::new()
    }
}
