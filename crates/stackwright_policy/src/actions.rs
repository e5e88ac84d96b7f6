//! Minimal action sets per consumer kind and access level.

use crate::intent::Access;
use stackwright_core::ResourceKind;

/// Actions the given access needs on a resource of `kind`
///
/// An empty slice means the flow is not meaningful for that kind.
/// Slices are sorted so synthesized grants are deterministic.
#[must_use]
pub fn actions_for(kind: ResourceKind, access: Access) -> &'static [&'static str] {
    use Access::*;
    use ResourceKind::*;

    match (kind, access) {
        (StorageBucket, Read) => &["s3:GetBucketLocation", "s3:GetObject", "s3:ListBucket"],
        (StorageBucket, Write) => &[
            "s3:AbortMultipartUpload",
            "s3:GetBucketLocation",
            "s3:ListBucket",
            "s3:PutObject",
        ],
        (StorageBucket, Admin) => &["s3:*"],

        (DeliveryStream, Read) => &["firehose:DescribeDeliveryStream"],
        (DeliveryStream, Write) => &["firehose:PutRecord", "firehose:PutRecordBatch"],
        (DeliveryStream, Admin) => &["firehose:*"],

        (LogSink, Read) => &["logs:FilterLogEvents", "logs:GetLogEvents"],
        (LogSink, Write) => &["logs:CreateLogStream", "logs:PutLogEvents"],
        (LogSink, Admin) => &["logs:*"],

        (ComputeFunction, Read) => &["lambda:GetFunction"],
        (ComputeFunction, Write | Invoke) => &["lambda:InvokeFunction"],
        (ComputeFunction, Admin) => &["lambda:*"],

        (Role, Read) => &["iam:GetRole"],
        (Role, Write) => &["iam:PassRole"],
        (Role, Admin) => &["iam:*"],

        _ => &[],
    }
}

/// Suffix matching the contained objects of a hierarchical resource
#[must_use]
pub fn wildcard_suffix(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::StorageBucket => Some("/*"),
        ResourceKind::LogSink => Some(":*"),
        _ => None,
    }
}

/// Action a service performs to assume a role
pub const ASSUME_ROLE: &str = "sts:AssumeRole";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_write_excludes_delete() {
        let actions = actions_for(ResourceKind::StorageBucket, Access::Write);
        assert!(actions.contains(&"s3:PutObject"));
        assert!(!actions.iter().any(|a| a.contains("Delete")));
    }

    #[test]
    fn test_read_and_write_disjoint_for_streams() {
        let read = actions_for(ResourceKind::DeliveryStream, Access::Read);
        let write = actions_for(ResourceKind::DeliveryStream, Access::Write);
        assert!(read.iter().all(|a| !write.contains(a)));
    }

    #[test]
    fn test_event_filter_has_no_flows() {
        for access in [Access::Read, Access::Write, Access::Invoke, Access::Admin] {
            assert!(actions_for(ResourceKind::EventFilter, access).is_empty());
        }
    }

    #[test]
    fn test_action_tables_sorted() {
        for kind in ResourceKind::ALL {
            for access in [Access::Read, Access::Write, Access::Invoke, Access::Admin] {
                let actions = actions_for(kind, access);
                assert!(actions.windows(2).all(|w| w[0] < w[1]), "{kind}/{access}");
            }
        }
    }

    #[test]
    fn test_wildcard_suffix() {
        assert_eq!(wildcard_suffix(ResourceKind::StorageBucket), Some("/*"));
        assert_eq!(wildcard_suffix(ResourceKind::Role), None);
    }
}
